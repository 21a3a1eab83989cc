use crate::accelerator::{Device, DeviceTensor};
use crate::config::GanParams;
use crate::constraints::ConstraintBounds;
use crate::error::{GanError, GanResult};
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;

/// A named weight tensor, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

pub type StateDict = BTreeMap<String, StateTensor>;

/// Contract of a trained generator: latent batch `(batch, z_dim)` in,
/// normalised feature batch `(batch, x_dim)` out.
pub trait Generator: fmt::Debug {
    fn z_dim(&self) -> usize;
    fn x_dim(&self) -> usize;
    fn forward(&self, z: &DeviceTensor) -> GanResult<DeviceTensor>;
    fn parameter_count(&self) -> usize;
    fn state_dict(&self) -> StateDict;
    fn load_state_dict(&mut self, state: &StateDict) -> GanResult<()>;
    fn to_device(&mut self, device: Device) -> GanResult<()>;
    fn current_device(&self) -> Device;
}

#[derive(Debug, Clone)]
struct Linear {
    weight: Array2<f32>, // [out_features, in_features]
    bias: Array1<f32>,   // [out_features]
}

impl Linear {
    fn zeros(in_features: usize, out_features: usize) -> Self {
        Linear {
            weight: Array2::zeros((out_features, in_features)),
            bias: Array1::zeros(out_features),
        }
    }

    fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weight.t()) + &self.bias
    }
}

/// Fully connected generator: `Linear → ReLU` blocks, a final `Linear`, then
/// the output is clamped into the constraint bounds.
///
/// Weights are named like a sequential container (`net.0.weight`,
/// `net.2.weight`, ...), where odd indices belong to the activations.
#[derive(Debug, Clone)]
pub struct MlpGenerator {
    layers: Vec<Linear>,
    bounds: ConstraintBounds,
    device: Device,
}

fn weight_name(layer: usize) -> String {
    format!("net.{}.weight", 2 * layer)
}

fn bias_name(layer: usize) -> String {
    format!("net.{}.bias", 2 * layer)
}

impl MlpGenerator {
    /// Zero-initialised generator with the given hidden layer widths.
    pub fn new(
        z_dim: usize,
        hidden: &[usize],
        x_dim: usize,
        bounds: ConstraintBounds,
    ) -> GanResult<Self> {
        if z_dim == 0 || x_dim == 0 || hidden.iter().any(|&h| h == 0) {
            return Err(GanError::InvalidArgument(format!(
                "layer widths must be positive (z_dim {}, hidden {:?}, x_dim {})",
                z_dim, hidden, x_dim
            )));
        }
        if bounds.dim() != x_dim {
            return Err(GanError::ShapeMismatch(format!(
                "{} constraint bounds for x_dim {}",
                bounds.dim(),
                x_dim
            )));
        }

        let mut widths = Vec::with_capacity(hidden.len() + 2);
        widths.push(z_dim);
        widths.extend_from_slice(hidden);
        widths.push(x_dim);

        let layers = widths
            .windows(2)
            .map(|w| Linear::zeros(w[0], w[1]))
            .collect();

        Ok(Self { layers, bounds, device: Device::Cpu })
    }

    /// Architecture from `g_dim` / `g_layers`: one input block plus
    /// `g_layers` hidden blocks of width `g_dim`.
    pub fn from_params(params: &GanParams, bounds: ConstraintBounds) -> GanResult<Self> {
        let g_dim = params
            .g_dim
            .ok_or_else(|| GanError::InvalidParams("params have no g_dim".to_string()))?;
        let g_layers = params
            .g_layers
            .ok_or_else(|| GanError::InvalidParams("params have no g_layers".to_string()))?;
        Self::new(params.z_dim, &vec![g_dim; g_layers + 1], params.x_dim, bounds)
    }

    /// Architecture read off the weight shapes of `state`, weights restored.
    pub fn from_state_dict(state: &StateDict, bounds: ConstraintBounds) -> GanResult<Self> {
        let mut layer = 0;
        let mut widths = Vec::new();
        while let Some(weight) = state.get(&weight_name(layer)) {
            if weight.shape.len() != 2 {
                return Err(GanError::Checkpoint(format!(
                    "{} has rank {}, expected 2",
                    weight_name(layer),
                    weight.shape.len()
                )));
            }
            if widths.is_empty() {
                widths.push(weight.shape[1]);
            }
            widths.push(weight.shape[0]);
            layer += 1;
        }
        if widths.len() < 2 {
            return Err(GanError::Checkpoint(
                "generator state has no net.0.weight".to_string(),
            ));
        }

        let z_dim = widths[0];
        let x_dim = widths[widths.len() - 1];
        let hidden = &widths[1..widths.len() - 1];
        let mut generator = Self::new(z_dim, hidden, x_dim, bounds)?;
        generator.load_state_dict(state)?;
        Ok(generator)
    }

    /// Uniform `±1/sqrt(in_features)` initialisation.
    pub fn init_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for layer in &mut self.layers {
            let k = 1.0 / (layer.in_features() as f32).sqrt();
            let dist = Uniform::new_inclusive(-k, k);
            layer.weight.mapv_inplace(|_| dist.sample(&mut *rng));
            layer.bias.mapv_inplace(|_| dist.sample(&mut *rng));
        }
    }

    pub fn bounds(&self) -> &ConstraintBounds {
        &self.bounds
    }

    pub fn hidden_widths(&self) -> Vec<usize> {
        self.layers[..self.layers.len() - 1]
            .iter()
            .map(Linear::out_features)
            .collect()
    }
}

impl Generator for MlpGenerator {
    fn z_dim(&self) -> usize {
        self.layers[0].in_features()
    }

    fn x_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_features()
    }

    fn forward(&self, z: &DeviceTensor) -> GanResult<DeviceTensor> {
        if z.device() != self.device {
            return Err(GanError::InvalidArgument(format!(
                "Generator on {} received input on {}",
                self.device,
                z.device()
            )));
        }
        if z.shape()[1] != self.z_dim() {
            return Err(GanError::ShapeMismatch(format!(
                "latent batch has {} columns, generator expects z_dim {}",
                z.shape()[1],
                self.z_dim()
            )));
        }

        let last = self.layers.len() - 1;
        let mut h = z.view().to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h);
            if i < last {
                h.mapv_inplace(|v| v.max(0.0));
            }
        }
        self.bounds.clamp(&mut h)?;

        Ok(DeviceTensor::new(h, self.device))
    }

    fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.weight.len() + l.bias.len()).sum()
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (i, layer) in self.layers.iter().enumerate() {
            state.insert(
                weight_name(i),
                StateTensor {
                    shape: layer.weight.shape().to_vec(),
                    data: layer.weight.iter().copied().collect(),
                },
            );
            state.insert(
                bias_name(i),
                StateTensor {
                    shape: layer.bias.shape().to_vec(),
                    data: layer.bias.to_vec(),
                },
            );
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> GanResult<()> {
        let expected = 2 * self.layers.len();
        if state.len() != expected {
            return Err(GanError::Checkpoint(format!(
                "generator state has {} tensors, expected {}",
                state.len(),
                expected
            )));
        }

        for (i, layer) in self.layers.iter_mut().enumerate() {
            let (w_name, b_name) = (weight_name(i), bias_name(i));
            let w = state
                .get(&w_name)
                .ok_or_else(|| GanError::Checkpoint(format!("missing tensor {}", w_name)))?;
            let b = state
                .get(&b_name)
                .ok_or_else(|| GanError::Checkpoint(format!("missing tensor {}", b_name)))?;

            if w.shape != layer.weight.shape() || b.shape != layer.bias.shape() {
                return Err(GanError::ShapeMismatch(format!(
                    "layer {}: checkpoint shapes {:?}/{:?}, generator shapes {:?}/{:?}",
                    i,
                    w.shape,
                    b.shape,
                    layer.weight.shape(),
                    layer.bias.shape()
                )));
            }
            layer.weight = Array2::from_shape_vec(layer.weight.raw_dim(), w.data.clone())?;
            layer.bias = Array1::from_vec(b.data.clone());
        }
        Ok(())
    }

    fn to_device(&mut self, device: Device) -> GanResult<()> {
        self.device = device;
        Ok(())
    }

    fn current_device(&self) -> Device {
        self.device
    }
}

impl fmt::Display for MlpGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MlpGenerator(")?;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(
                f,
                "  (net.{}): Linear(in_features={}, out_features={})",
                2 * i,
                layer.in_features(),
                layer.out_features()
            )?;
            if i < last {
                writeln!(f, "  (net.{}): ReLU()", 2 * i + 1)?;
            }
        }
        write!(f, ")")
    }
}

/// Layer stack followed by the total parameter count.
pub fn describe_network<G: Generator + fmt::Display>(generator: &G) -> String {
    format!(
        "{}\nTotal number of parameters: {}",
        generator,
        generator.parameter_count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_generator() -> MlpGenerator {
        // z_dim 2 -> 3 -> x_dim 2
        let mut g = MlpGenerator::new(2, &[3], 2, ConstraintBounds::unconstrained(2)).unwrap();
        let mut state = g.state_dict();
        state.get_mut("net.0.weight").unwrap().data = vec![1.0, 0.0, 0.0, 1.0, -1.0, -1.0];
        state.get_mut("net.0.bias").unwrap().data = vec![0.0, 0.0, 0.0];
        state.get_mut("net.2.weight").unwrap().data = vec![1.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        state.get_mut("net.2.bias").unwrap().data = vec![0.5, -0.5];
        g.load_state_dict(&state).unwrap();
        g
    }

    #[test]
    fn test_parameter_count() {
        let g = MlpGenerator::new(4, &[8, 8], 3, ConstraintBounds::unconstrained(3)).unwrap();
        // (4*8 + 8) + (8*8 + 8) + (8*3 + 3)
        assert_eq!(g.parameter_count(), 40 + 72 + 27);
        assert_eq!(g.hidden_widths(), vec![8, 8]);
    }

    #[test]
    fn test_forward_applies_relu_between_layers() {
        let g = small_generator();
        let z = DeviceTensor::new(array![[1.0f32, 2.0], [-1.0, 0.5]], Device::Cpu);
        let out = g.forward(&z).unwrap().into_host();
        // row 0: hidden = relu([1, 2, -3]) = [1, 2, 0]; out = [1+2+0.5, 0-0.5]
        // row 1: hidden = relu([-1, 0.5, 0.5]) = [0, 0.5, 0.5]; out = [0.5+0.5, 0.5-0.5]
        assert_eq!(out, array![[3.5f32, -0.5], [1.0, 0.0]]);
    }

    #[test]
    fn test_forward_clamps_into_bounds() {
        let mut g = small_generator();
        g.bounds = ConstraintBounds { min: array![-1.0f32, -0.25], max: array![2.0f32, 1.0] };
        let z = DeviceTensor::new(array![[1.0f32, 2.0]], Device::Cpu);
        let out = g.forward(&z).unwrap().into_host();
        assert_eq!(out, array![[2.0f32, -0.25]]);
    }

    #[test]
    fn test_forward_rejects_wrong_device_and_width() {
        let g = small_generator();
        let on_gpu = DeviceTensor::new(array![[1.0f32, 2.0]], Device::Cuda(0));
        assert!(g.forward(&on_gpu).is_err());
        let too_wide = DeviceTensor::new(array![[1.0f32, 2.0, 3.0]], Device::Cpu);
        assert!(matches!(g.forward(&too_wide), Err(GanError::ShapeMismatch(_))));
    }

    #[test]
    fn test_state_dict_restores_into_inferred_architecture() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut g = MlpGenerator::new(3, &[5, 4], 2, ConstraintBounds::unconstrained(2)).unwrap();
        g.init_random(&mut rng);

        let restored =
            MlpGenerator::from_state_dict(&g.state_dict(), ConstraintBounds::unconstrained(2))
                .unwrap();
        assert_eq!(restored.z_dim(), 3);
        assert_eq!(restored.x_dim(), 2);
        assert_eq!(restored.hidden_widths(), vec![5, 4]);
        assert_eq!(restored.state_dict(), g.state_dict());
    }

    #[test]
    fn test_load_state_dict_rejects_wrong_shapes() {
        let source = MlpGenerator::new(2, &[4], 2, ConstraintBounds::unconstrained(2)).unwrap();
        let mut target = MlpGenerator::new(2, &[3], 2, ConstraintBounds::unconstrained(2)).unwrap();
        assert!(matches!(
            target.load_state_dict(&source.state_dict()),
            Err(GanError::ShapeMismatch(_))
        ));

        let mut partial = source.state_dict();
        partial.remove("net.2.bias");
        let mut same_arch = source.clone();
        assert!(same_arch.load_state_dict(&partial).is_err());
    }

    #[test]
    fn test_from_params_builds_g_layers_plus_one_hidden_blocks() {
        let params = GanParams {
            x_dim: 2,
            z_dim: 3,
            keys: vec!["a".into(), "b".into()],
            x_mean: vec![0.0, 0.0],
            x_std: vec![1.0, 1.0],
            g_dim: Some(6),
            g_layers: Some(2),
            ..Default::default()
        };
        let g = MlpGenerator::from_params(&params, ConstraintBounds::unconstrained(2)).unwrap();
        assert_eq!(g.hidden_widths(), vec![6, 6, 6]);

        let no_arch = GanParams { g_dim: None, ..params };
        assert!(MlpGenerator::from_params(&no_arch, ConstraintBounds::unconstrained(2)).is_err());
    }

    #[test]
    fn test_describe_network_mentions_parameter_total() {
        let g = small_generator();
        let text = describe_network(&g);
        assert!(text.contains("(net.0): Linear(in_features=2, out_features=3)"));
        assert!(text.contains("(net.1): ReLU()"));
        assert!(text.ends_with("Total number of parameters: 17"));
    }
}
