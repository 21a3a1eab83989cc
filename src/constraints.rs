use crate::config::GanParams;
use crate::error::{GanError, GanResult};
use log::debug;
use ndarray::{Array1, Array2, Axis, Zip};

/// Raw bound used for features without a constraint entry.
pub const UNCONSTRAINED_BOUND: f64 = 9999.0;

/// Per-feature clamp range in normalised space.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintBounds {
    pub min: Array1<f32>,
    pub max: Array1<f32>,
}

/// Computes the min/max bound of every feature from `keys` and `constraints`,
/// then applies the `(v - mean) / std` normalisation to both vectors.
pub fn get_min_max_constraints(params: &GanParams) -> GanResult<ConstraintBounds> {
    let x_dim = params.x_dim;
    if params.x_mean.len() != x_dim || params.x_std.len() != x_dim {
        return Err(GanError::InvalidParams(format!(
            "normalisation statistics must have {} entries",
            x_dim
        )));
    }

    let mut cmin = Array1::from_elem(x_dim, -UNCONSTRAINED_BOUND);
    let mut cmax = Array1::from_elem(x_dim, UNCONSTRAINED_BOUND);
    for (key, [lo, hi]) in &params.constraints {
        match params.key_index(key) {
            Some(index) if index < x_dim => {
                cmin[index] = *lo;
                cmax[index] = *hi;
            }
            _ => debug!("Constraint on unknown key '{}' skipped", key),
        }
    }

    let mean = Array1::from_vec(params.x_mean.clone());
    let std = Array1::from_vec(params.x_std.clone());
    let cmin = (cmin - &mean) / &std;
    let cmax = (cmax - &mean) / &std;

    Ok(ConstraintBounds {
        min: cmin.mapv(|v| v as f32),
        max: cmax.mapv(|v| v as f32),
    })
}

impl ConstraintBounds {
    pub fn unconstrained(x_dim: usize) -> Self {
        ConstraintBounds {
            min: Array1::from_elem(x_dim, f32::NEG_INFINITY),
            max: Array1::from_elem(x_dim, f32::INFINITY),
        }
    }

    pub fn dim(&self) -> usize {
        self.min.len()
    }

    /// Clamps each column of `x` into `[min, max]`, in place.
    pub fn clamp(&self, x: &mut Array2<f32>) -> GanResult<()> {
        if x.ncols() != self.dim() {
            return Err(GanError::ShapeMismatch(format!(
                "cannot clamp {} features with {} bounds",
                x.ncols(),
                self.dim()
            )));
        }
        for mut row in x.axis_iter_mut(Axis(0)) {
            Zip::from(&mut row)
                .and(&self.min)
                .and(&self.max)
                .for_each(|v, &lo, &hi| *v = v.min(hi).max(lo));
        }
        Ok(())
    }
}
