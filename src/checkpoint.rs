// src/checkpoint.rs

use crate::accelerator::{select_device, Accelerator, AcceleratorProbe, GpuMode, SystemProbe, TensorType};
use crate::config::GanParams;
use crate::constraints::get_min_max_constraints;
use crate::error::{GanError, GanResult};
use crate::generator::{Generator, MlpGenerator, StateDict, StateTensor};
use crate::history::OptimHistory;
use log::{debug, info, warn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const PARAMS_KEY: &str = "params";
pub const OPTIM_KEY: &str = "optim";
/// Older checkpoints store the optimisation history under this name.
pub const LEGACY_OPTIM_KEY: &str = "model";

/// Everything stored in a checkpoint file, before any generator is built.
#[derive(Debug, Clone)]
pub struct CheckpointContents {
    pub params: GanParams,
    pub optim: OptimHistory,
    pub g_model_state: StateDict,
}

/// A trained GAN restored from disk.
#[derive(Debug)]
pub struct LoadedGan {
    pub params: GanParams,
    pub generator: MlpGenerator,
    pub optim: OptimHistory,
    pub dtype: TensorType,
}

pub fn read_checkpoint<P: AsRef<Path>>(path: P) -> GanResult<CheckpointContents> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;

    let (_, metadata) = SafeTensors::read_metadata(&bytes)?;
    let fields = metadata.metadata().as_ref().ok_or_else(|| {
        GanError::Checkpoint(format!("{} carries no metadata", path.display()))
    })?;

    let params_json = fields.get(PARAMS_KEY).ok_or_else(|| {
        GanError::Checkpoint(format!("{} has no '{}' field", path.display(), PARAMS_KEY))
    })?;
    let params = GanParams::from_json(params_json)?;

    let optim_json = match fields.get(OPTIM_KEY) {
        Some(json) => json,
        None => {
            debug!("No '{}' field, using legacy '{}'", OPTIM_KEY, LEGACY_OPTIM_KEY);
            fields.get(LEGACY_OPTIM_KEY).ok_or_else(|| {
                GanError::Checkpoint(format!(
                    "{} has neither '{}' nor '{}'",
                    path.display(),
                    OPTIM_KEY,
                    LEGACY_OPTIM_KEY
                ))
            })?
        }
    };
    let optim: OptimHistory = serde_json::from_str(optim_json)?;

    let tensors = SafeTensors::deserialize(&bytes)?;
    let mut g_model_state = StateDict::new();
    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(GanError::Checkpoint(format!(
                "Unsupported dtype {:?} for tensor '{}'. Only F32 is supported.",
                view.dtype(),
                name
            )));
        }
        let data = view
            .data()
            .chunks_exact(std::mem::size_of::<f32>())
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        g_model_state.insert(name, StateTensor { shape: view.shape().to_vec(), data });
    }
    if g_model_state.is_empty() {
        return Err(GanError::Checkpoint(format!(
            "{} has no g_model_state tensors",
            path.display()
        )));
    }

    Ok(CheckpointContents { params, optim, g_model_state })
}

/// Loads a checkpoint, placing the generator on the accelerator when the host has one.
pub fn load<P: AsRef<Path>>(path: P, verbose: bool) -> GanResult<LoadedGan> {
    load_with_probe(path, &SystemProbe, verbose)
}

pub fn load_with_probe<P: AsRef<Path>>(
    path: P,
    probe: &dyn AcceleratorProbe,
    verbose: bool,
) -> GanResult<LoadedGan> {
    load_with_mode(path, GpuMode::Auto, probe, verbose)
}

/// Same as [`load`], with an explicit device policy.
pub fn load_with_mode<P: AsRef<Path>>(
    path: P,
    mode: GpuMode,
    probe: &dyn AcceleratorProbe,
    verbose: bool,
) -> GanResult<LoadedGan> {
    let selection = select_device(mode, probe, verbose)?;
    let CheckpointContents { mut params, optim, g_model_state } = read_checkpoint(&path)?;

    let bounds = get_min_max_constraints(&params)?;
    let mut generator = match (params.g_dim, params.g_layers) {
        (Some(_), Some(_)) => {
            let mut g = MlpGenerator::from_params(&params, bounds)?;
            g.load_state_dict(&g_model_state)?;
            g
        }
        _ => MlpGenerator::from_state_dict(&g_model_state, bounds)?,
    };
    if generator.z_dim() != params.z_dim || generator.x_dim() != params.x_dim {
        return Err(GanError::ShapeMismatch(format!(
            "generator maps {} -> {}, params say z_dim {} / x_dim {}",
            generator.z_dim(),
            generator.x_dim(),
            params.z_dim,
            params.x_dim
        )));
    }

    let accelerator = Accelerator::new(selection);
    accelerator.prepare(&mut generator)?;
    params.current_gpu = Some(accelerator.current_device().is_accelerator());

    info!(
        "Loaded {} ({} parameters) on {}",
        path.as_ref().display(),
        generator.parameter_count(),
        accelerator.current_device()
    );

    Ok(LoadedGan { params, generator, optim, dtype: accelerator.dtype() })
}

fn write_checkpoint(
    path: &Path,
    params: &GanParams,
    state: &StateDict,
    history_key: &str,
    optim: &OptimHistory,
) -> GanResult<()> {
    let mut stored = params.clone();
    stored.current_gpu = None;

    let mut metadata = HashMap::new();
    metadata.insert(PARAMS_KEY.to_string(), stored.to_json()?);
    metadata.insert(history_key.to_string(), serde_json::to_string(optim)?);

    let tensor_data: Vec<(&str, &[u8], Vec<usize>)> = state
        .iter()
        .map(|(name, t)| (name.as_str(), bytemuck::cast_slice(t.data.as_slice()), t.shape.clone()))
        .collect();
    let views = tensor_data
        .iter()
        .map(|(name, bytes, shape)| Ok((*name, TensorView::new(Dtype::F32, shape.clone(), bytes)?)))
        .collect::<GanResult<Vec<(&str, TensorView<'_>)>>>()?;

    let bytes = safetensors::serialize(views.iter().map(|(name, view)| (*name, view)), &Some(metadata))?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Writes params, generator weights and history to `path`.
pub fn save<P: AsRef<Path>, G: Generator + ?Sized>(
    path: P,
    params: &GanParams,
    generator: &G,
    optim: &OptimHistory,
) -> GanResult<()> {
    let path = path.as_ref();
    if generator.z_dim() != params.z_dim || generator.x_dim() != params.x_dim {
        warn!(
            "Saving a {} -> {} generator with params z_dim {} / x_dim {}",
            generator.z_dim(),
            generator.x_dim(),
            params.z_dim,
            params.x_dim
        );
    }
    write_checkpoint(path, params, &generator.state_dict(), OPTIM_KEY, optim)?;
    info!("Saved checkpoint {}", path.display());
    Ok(())
}
