use crate::error::{GanError, GanResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_stats::QuantileExt;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Histogram range from the extremes of the reference sample, widened by
/// `margin` times each bound.
pub fn histogram_range(lo: f64, hi: f64, margin: f64) -> (f64, f64) {
    if lo < 0.0 {
        (lo + margin * lo, hi + margin * hi)
    } else {
        (lo - margin * lo, hi + margin * hi)
    }
}

/// Bin counts over `[lo, hi]` split into `bins` equal-width bins.
///
/// The last bin is closed, values outside the range are dropped and an empty
/// range is widened to `[lo - 0.5, hi + 0.5]`. A value sitting on a bin edge
/// goes to the bin that edge opens, with edges computed as `lo + i * step`.
pub fn histogram(values: ArrayView1<'_, f32>, bins: usize, range: (f64, f64)) -> Array1<f64> {
    let (mut lo, mut hi) = range;
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let mut counts = Array1::<f64>::zeros(bins);
    if bins == 0 {
        return counts;
    }
    let edges = bin_edges(lo, hi, bins);
    let norm = bins as f64 / (hi - lo);
    for &v in values {
        let v = f64::from(v);
        if !(lo..=hi).contains(&v) {
            continue;
        }
        let mut index = (((v - lo) * norm) as usize).min(bins - 1);
        // the scaled index can be off by one next to an edge
        if index > 0 && v < edges[index] {
            index -= 1;
        } else if index + 1 < bins && v >= edges[index + 1] {
            index += 1;
        }
        counts[index] += 1.0;
    }
    counts
}

/// `bins + 1` evenly spaced edges, the last one pinned to `hi`.
pub fn bin_edges(lo: f64, hi: f64, bins: usize) -> Array1<f64> {
    let step = (hi - lo) / bins as f64;
    let mut edges = Array1::from_shape_fn(bins + 1, |i| lo + i as f64 * step);
    edges[bins] = hi;
    edges
}

fn normalize_l1(counts: Array1<f64>) -> Option<Array1<f64>> {
    let total = counts.sum();
    if total > 0.0 {
        Some(counts / total)
    } else {
        None
    }
}

/// `KL(p || q)` in nats. Terms with `p == 0` contribute nothing.
pub fn relative_entropy(p: ArrayView1<'_, f64>, q: ArrayView1<'_, f64>) -> f64 {
    p.iter()
        .zip(q.iter())
        .filter(|(&pi, _)| pi > 0.0)
        .map(|(&pi, &qi)| pi * (pi / qi).ln())
        .sum()
}

/// Jensen-Shannon divergence between the histograms of `x` and `y`.
///
/// Both histograms share the bins derived from the range of `x` alone, so the
/// measure is not symmetric in its arguments.
pub fn jensen_shannon_divergence(
    x: ArrayView1<'_, f32>,
    y: ArrayView1<'_, f32>,
    bins: usize,
    margin: f64,
) -> GanResult<f64> {
    if bins == 0 {
        return Err(GanError::InvalidArgument("histogram needs at least one bin".to_string()));
    }
    let lo = *x.min().map_err(|e| GanError::InvalidArgument(format!("reference sample: {}", e)))?;
    let hi = *x.max().map_err(|e| GanError::InvalidArgument(format!("reference sample: {}", e)))?;
    let range = histogram_range(f64::from(lo), f64::from(hi), margin);

    let p = normalize_l1(histogram(x, bins, range)).ok_or_else(|| {
        GanError::InvalidArgument("reference sample is empty".to_string())
    })?;
    let q = normalize_l1(histogram(y, bins, range)).ok_or_else(|| {
        GanError::InvalidArgument(format!(
            "no compared value falls within [{}, {}]",
            range.0, range.1
        ))
    })?;

    let m = (&p + &q) * 0.5;
    Ok(0.5 * (relative_entropy(p.view(), m.view()) + relative_entropy(q.view(), m.view())))
}

/// JSD of every feature column of `y` against the matching column of `x`.
pub fn jsd_per_feature(
    x: ArrayView2<'_, f32>,
    y: ArrayView2<'_, f32>,
    bins: usize,
    margin: f64,
) -> GanResult<Vec<f64>> {
    if x.ncols() != y.ncols() {
        return Err(GanError::ShapeMismatch(format!(
            "{} reference features, {} compared features",
            x.ncols(),
            y.ncols()
        )));
    }
    x.axis_iter(Axis(1))
        .zip(y.axis_iter(Axis(1)))
        .map(|(xc, yc)| jensen_shannon_divergence(xc, yc, bins, margin))
        .collect()
}

/// `mean(|sort(x)[i] - sort(y)[i]|^p)`. No p-th root is taken.
pub fn wasserstein_1d(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>, p: f64) -> GanResult<f64> {
    if x.len() != y.len() {
        return Err(GanError::ShapeMismatch(format!(
            "1-D Wasserstein needs equal sizes, got {} and {}",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(GanError::InvalidArgument("1-D Wasserstein of empty samples".to_string()));
    }
    let mut sx = x.to_vec();
    let mut sy = y.to_vec();
    sx.sort_by(|a, b| a.total_cmp(b));
    sy.sort_by(|a, b| a.total_cmp(b));
    let total: f64 = sx.iter().zip(&sy).map(|(a, b)| (a - b).abs().powf(p)).sum();
    Ok(total / sx.len() as f64)
}

pub fn sliced_wasserstein(
    x: ArrayView2<'_, f32>,
    y: ArrayView2<'_, f32>,
    l: usize,
    p: f64,
) -> GanResult<f64> {
    sliced_wasserstein_with_rng(x, y, l, p, &mut rand::thread_rng())
}

pub fn sliced_wasserstein_with_rng<R: Rng + ?Sized>(
    x: ArrayView2<'_, f32>,
    y: ArrayView2<'_, f32>,
    l: usize,
    p: f64,
    rng: &mut R,
) -> GanResult<f64> {
    if l == 0 {
        return Err(GanError::InvalidArgument("at least one direction is required".to_string()));
    }
    let directions: Array2<f64> =
        Array2::from_shape_simple_fn((x.ncols(), l), || StandardNormal.sample(&mut *rng));
    sliced_wasserstein_with_directions(x, y, directions.view(), p)
}

/// Sliced Wasserstein distance along the columns of `directions` (D x l).
/// Each column is scaled to unit length first.
pub fn sliced_wasserstein_with_directions(
    x: ArrayView2<'_, f32>,
    y: ArrayView2<'_, f32>,
    directions: ArrayView2<'_, f64>,
    p: f64,
) -> GanResult<f64> {
    if x.ncols() != y.ncols() || x.ncols() != directions.nrows() {
        return Err(GanError::ShapeMismatch(format!(
            "feature dimensions differ: x {}, y {}, directions {}",
            x.ncols(),
            y.ncols(),
            directions.nrows()
        )));
    }
    if x.nrows() != y.nrows() {
        return Err(GanError::ShapeMismatch(format!(
            "sample counts differ: {} and {}",
            x.nrows(),
            y.nrows()
        )));
    }
    if x.nrows() == 0 || directions.ncols() == 0 {
        return Err(GanError::InvalidArgument(
            "sliced Wasserstein needs samples and directions".to_string(),
        ));
    }

    let norms = directions.map_axis(Axis(0), |c| c.dot(&c).sqrt());
    if norms.iter().any(|&n| n == 0.0) {
        return Err(GanError::InvalidArgument("zero-length projection direction".to_string()));
    }
    let directions = &directions / &norms;

    let px = x.mapv(f64::from).dot(&directions);
    let py = y.mapv(f64::from).dot(&directions);

    let mut total = 0.0;
    for (cx, cy) in px.axis_iter(Axis(1)).zip(py.axis_iter(Axis(1))) {
        total += wasserstein_1d(cx, cy, p)?;
    }
    Ok(total / directions.ncols() as f64)
}
