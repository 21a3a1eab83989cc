use crate::config::{GanParams, DATE_FORMAT};
use crate::error::{GanError, GanResult};
use chrono::{Duration, NaiveDateTime};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const D_LOSS_REAL: &str = "d_loss_real";
pub const D_LOSS_FAKE: &str = "d_loss_fake";
pub const G_LOSS: &str = "g_loss";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum HistoryEntry {
    Series(Vec<f64>),
    Other(Value),
}

/// Per-epoch training metrics, keyed by metric name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct OptimHistory(BTreeMap<String, HistoryEntry>);

impl OptimHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one epoch value to `metric`, creating the series if needed.
    pub fn push(&mut self, metric: &str, value: f64) -> GanResult<()> {
        match self
            .0
            .entry(metric.to_string())
            .or_insert_with(|| HistoryEntry::Series(Vec::new()))
        {
            HistoryEntry::Series(values) => {
                values.push(value);
                Ok(())
            }
            HistoryEntry::Other(_) => Err(GanError::InvalidArgument(format!(
                "history entry '{}' is not a per-epoch series",
                metric
            ))),
        }
    }

    pub fn series(&self, metric: &str) -> Option<&[f64]> {
        match self.0.get(metric) {
            Some(HistoryEntry::Series(values)) => Some(values),
            _ => None,
        }
    }

    pub fn last(&self, metric: &str) -> Option<f64> {
        self.series(metric).and_then(|s| s.last().copied())
    }

    pub fn get(&self, key: &str) -> Option<&HistoryEntry> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Discriminator loss of the last epoch, real plus fake term.
    pub fn final_d_loss(&self) -> Option<f64> {
        Some(self.last(D_LOSS_REAL)? + self.last(D_LOSS_FAKE)?)
    }

    pub fn final_g_loss(&self) -> Option<f64> {
        self.last(G_LOSS)
    }
}

/// Training duration from the `start date` / `end date` entries.
///
/// If either date is missing or does not parse, both count as zero and the
/// duration is zero.
pub fn training_duration(params: &GanParams) -> Duration {
    let parse = |s: &Option<String>| {
        s.as_deref()
            .and_then(|d| NaiveDateTime::parse_from_str(d, DATE_FORMAT).ok())
    };
    match (parse(&params.start_date), parse(&params.end_date)) {
        (Some(start), Some(end)) => end - start,
        _ => {
            warn!(
                "Cannot compute training duration from start {:?} / end {:?}",
                params.start_date, params.end_date
            );
            Duration::zero()
        }
    }
}

/// `[D day[s], ]H:MM:SS`, days floor towards negative infinity.
pub fn format_duration(d: Duration) -> String {
    let total = d.num_seconds();
    let days = total.div_euclid(86_400);
    let rest = total.rem_euclid(86_400);
    let hms = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => hms,
        1 | -1 => format!("{} day, {}", days, hms),
        _ => format!("{} days, {}", days, hms),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Human-readable digest of a trained GAN.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub entries: Vec<(String, String)>,
    pub duration: Duration,
    pub final_d_loss: Option<f64>,
    pub final_g_loss: Option<f64>,
}

impl TrainingSummary {
    pub fn new(params: &GanParams, optim: &OptimHistory) -> GanResult<Self> {
        let entries = params
            .entries()?
            .into_iter()
            .filter(|(name, _)| !name.starts_with('#') && name != "x_mean" && name != "x_std")
            .map(|(name, value)| (name, display_value(&value)))
            .collect();

        Ok(TrainingSummary {
            entries,
            duration: training_duration(params),
            final_d_loss: optim.final_d_loss(),
            final_g_loss: optim.final_g_loss(),
        })
    }
}

impl fmt::Display for TrainingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loss = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        for (name, value) in &self.entries {
            writeln!(f, "   {:20} {}", name, value)?;
        }
        writeln!(f, "   {:20} {}", "Duration", format_duration(self.duration))?;
        writeln!(f, "   {:20} {}", "Final d_loss", loss(self.final_d_loss))?;
        write!(f, "   {:20} {}", "Final g_loss", loss(self.final_g_loss))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LossWindow {
    pub start: usize,
    pub end: usize,
    /// Y limits over the window; `None` when the window is empty.
    pub y_range: Option<(f64, f64)>,
}

impl LossWindow {
    fn over(curve: &[f64], start: usize, end: usize) -> Self {
        let window = &curve[start..end];
        let y_range = if window.is_empty() {
            None
        } else {
            let lo = window.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some((lo, hi))
        };
        LossWindow { start, end, y_range }
    }
}

/// Discriminator loss curve with a zoom on the first 20% of the epochs and
/// on the last `max(10, 1%)` epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochPanels {
    pub d_loss: Vec<f64>,
    pub head: LossWindow,
    pub tail: LossWindow,
}

impl EpochPanels {
    pub fn from_history(optim: &OptimHistory) -> GanResult<Self> {
        let real = optim.series(D_LOSS_REAL).ok_or_else(|| {
            GanError::InvalidArgument(format!("history has no {} series", D_LOSS_REAL))
        })?;
        let fake = optim.series(D_LOSS_FAKE).ok_or_else(|| {
            GanError::InvalidArgument(format!("history has no {} series", D_LOSS_FAKE))
        })?;
        if real.len() != fake.len() {
            return Err(GanError::ShapeMismatch(format!(
                "{} has {} epochs, {} has {}",
                D_LOSS_REAL,
                real.len(),
                D_LOSS_FAKE,
                fake.len()
            )));
        }

        let d_loss: Vec<f64> = real.iter().zip(fake).map(|(r, f)| -(r + f)).collect();
        let len = d_loss.len();

        let head_len = (len as f64 * 0.2) as usize;
        let head = LossWindow::over(&d_loss, 0, head_len);

        let tail_len = usize::max(10, (len as f64 * 0.01) as usize);
        let tail = LossWindow::over(&d_loss, len.saturating_sub(tail_len), len);

        Ok(EpochPanels { d_loss, head, tail })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn history(epochs: usize) -> OptimHistory {
        let mut h = OptimHistory::new();
        for e in 0..epochs {
            h.push(D_LOSS_REAL, -(e as f64)).unwrap();
            h.push(D_LOSS_FAKE, 0.5).unwrap();
            h.push(G_LOSS, e as f64 * 0.1).unwrap();
        }
        h
    }

    fn params_with_dates(start: Option<&str>, end: Option<&str>) -> GanParams {
        GanParams {
            x_dim: 1,
            z_dim: 1,
            keys: vec!["E".into()],
            x_mean: vec![0.0],
            x_std: vec![1.0],
            start_date: start.map(String::from),
            end_date: end.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_push_appends_in_order() {
        let h = history(3);
        assert_eq!(h.series(D_LOSS_REAL), Some(&[0.0, -1.0, -2.0][..]));
        assert_eq!(h.last(G_LOSS), Some(2.0 * 0.1));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_push_into_non_series_entry_fails() {
        let mut h: OptimHistory = serde_json::from_str(r#"{"note": "x", "g_loss": [1.0]}"#).unwrap();
        assert!(h.push("note", 1.0).is_err());
        assert!(h.push(G_LOSS, 2.0).is_ok());
        assert_eq!(h.series(G_LOSS), Some(&[1.0, 2.0][..]));
        assert_eq!(h.get("note"), Some(&HistoryEntry::Other(Value::from("x"))));
    }

    #[test]
    fn test_final_losses() {
        let h = history(4);
        assert_abs_diff_eq!(h.final_d_loss().unwrap(), -3.0 + 0.5);
        assert_abs_diff_eq!(h.final_g_loss().unwrap(), 0.3, epsilon = 1e-12);
        assert_eq!(OptimHistory::new().final_d_loss(), None);
    }

    #[test]
    fn test_training_duration_from_dates() {
        let p = params_with_dates(Some("2019-03-01 10:00:00"), Some("2019-03-02 12:30:15"));
        let d = training_duration(&p);
        assert_eq!(d.num_seconds(), 86_400 + 2 * 3600 + 30 * 60 + 15);
        assert_eq!(format_duration(d), "1 day, 2:30:15");
    }

    #[test]
    fn test_malformed_dates_yield_zero_duration() {
        let p = params_with_dates(Some("2019-03-01 10:00:00"), Some("yesterday"));
        assert_eq!(training_duration(&p), Duration::zero());
        let p = params_with_dates(None, Some("2019-03-01 10:00:00"));
        assert_eq!(training_duration(&p), Duration::zero());
        assert_eq!(format_duration(Duration::zero()), "0:00:00");
    }

    #[test]
    fn test_negative_duration_format() {
        assert_eq!(format_duration(Duration::seconds(-3600)), "-1 day, 23:00:00");
    }

    #[test]
    fn test_summary_hides_statistics_and_comments() {
        let mut p = params_with_dates(Some("2019-03-01 10:00:00"), Some("2019-03-01 11:00:00"));
        p.extra.insert("#note".to_string(), Value::from("hidden"));
        p.extra.insert("epoch".to_string(), Value::from(10));
        let summary = TrainingSummary::new(&p, &history(2)).unwrap();

        let names: Vec<&str> = summary.entries.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"epoch"));
        assert!(names.contains(&"keys"));
        assert!(!names.contains(&"x_mean"));
        assert!(!names.contains(&"x_std"));
        assert!(!names.contains(&"#note"));

        let text = summary.to_string();
        assert!(text.contains("   Duration             1:00:00"));
        assert!(text.contains("   Final d_loss         -0.5"));
        assert!(text.contains("   start date           2019-03-01 10:00:00"));
    }

    #[test]
    fn test_epoch_panels_windows() {
        let panels = EpochPanels::from_history(&history(50)).unwrap();
        assert_eq!(panels.d_loss.len(), 50);
        assert_abs_diff_eq!(panels.d_loss[3], 3.0 - 0.5);
        assert_eq!((panels.head.start, panels.head.end), (0, 10));
        assert_eq!(panels.head.y_range, Some((-0.5, 8.5)));
        assert_eq!((panels.tail.start, panels.tail.end), (40, 50));
        assert_eq!(panels.tail.y_range, Some((39.5, 48.5)));
    }

    #[test]
    fn test_epoch_panels_short_history() {
        let panels = EpochPanels::from_history(&history(3)).unwrap();
        assert_eq!(panels.head.y_range, None);
        assert_eq!((panels.tail.start, panels.tail.end), (0, 3));
        assert!(EpochPanels::from_history(&OptimHistory::new()).is_err());
    }
}
