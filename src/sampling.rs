use crate::accelerator::{DeviceTensor, TensorType};
use crate::config::GanParams;
use crate::error::{GanError, GanResult};
use crate::generator::Generator;
use log::debug;
use ndarray::{concatenate, Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// `None` generates everything in one batch and forces host output.
    pub batch_size: Option<usize>,
    /// Map back to physical units with `x * std + mean`.
    pub un_norm: bool,
    /// Collect every batch into one host array instead of keeping the device batch.
    pub to_host: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        GenerateOptions { batch_size: None, un_norm: true, to_host: false }
    }
}

/// Result of a generation run.
///
/// In device mode only the last batch is kept, so `LastBatch` holds at most
/// `batch_size` rows regardless of `n`.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedSamples {
    Host(Array2<f32>),
    LastBatch(DeviceTensor),
}

impl GeneratedSamples {
    pub fn nrows(&self) -> usize {
        match self {
            GeneratedSamples::Host(a) => a.nrows(),
            GeneratedSamples::LastBatch(t) => t.nrows(),
        }
    }

    pub fn into_host(self) -> Array2<f32> {
        match self {
            GeneratedSamples::Host(a) => a,
            GeneratedSamples::LastBatch(t) => t.into_host(),
        }
    }
}

/// `(rows, cols)` standard normal draws.
pub fn latent_noise<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    Array2::from_shape_simple_fn((rows, cols), || StandardNormal.sample(&mut *rng))
}

/// `x * std + mean`, column-wise.
pub fn denormalize(x: Array2<f32>, params: &GanParams) -> Array2<f32> {
    let mean: Array1<f32> = params.x_mean.iter().map(|&v| v as f32).collect();
    let std: Array1<f32> = params.x_std.iter().map(|&v| v as f32).collect();
    x * &std + &mean
}

pub fn generate_samples<G: Generator + ?Sized>(
    params: &GanParams,
    generator: &G,
    n: usize,
    options: GenerateOptions,
) -> GanResult<GeneratedSamples> {
    generate_samples_with_rng(params, generator, n, options, &mut rand::thread_rng())
}

pub fn generate_samples_with_rng<G: Generator + ?Sized, R: Rng + ?Sized>(
    params: &GanParams,
    generator: &G,
    n: usize,
    options: GenerateOptions,
    rng: &mut R,
) -> GanResult<GeneratedSamples> {
    let (mut batch_size, to_host) = match options.batch_size {
        None => (n, true),
        Some(b) => (b.min(n), options.to_host),
    };
    if batch_size == 0 && n > 0 {
        return Err(GanError::InvalidArgument("batch size must be positive".to_string()));
    }
    if params.x_mean.len() != params.x_dim || params.x_std.len() != params.x_dim {
        return Err(GanError::InvalidParams(format!(
            "normalisation statistics must have {} entries",
            params.x_dim
        )));
    }

    let device = TensorType::for_gpu(params.current_gpu.unwrap_or(false)).device();
    let mut batches: Vec<Array2<f32>> = Vec::new();
    let mut last: Option<DeviceTensor> = None;

    let mut m = 0;
    while m < n {
        let z = DeviceTensor::new(latent_noise(batch_size, params.z_dim, rng), device);
        let mut fake = generator.forward(&z)?;
        if options.un_norm {
            fake = fake.map_array(|x| denormalize(x, params));
        }
        if to_host {
            batches.push(fake.into_host());
        } else {
            last = Some(fake);
        }
        m += batch_size;
        if m + batch_size > n {
            batch_size = n - m;
        }
    }
    debug!("Generated {} samples on {}", n, device);

    if to_host {
        if batches.is_empty() {
            return Ok(GeneratedSamples::Host(Array2::zeros((0, params.x_dim))));
        }
        let views: Vec<_> = batches.iter().map(|b| b.view()).collect();
        return Ok(GeneratedSamples::Host(concatenate(Axis(0), &views)?));
    }
    last.map(GeneratedSamples::LastBatch).ok_or_else(|| {
        GanError::InvalidArgument("no samples requested, nothing to keep on device".to_string())
    })
}
