use crate::error::{GanError, GanResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Timestamp layout of the `start date` / `end date` entries.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parameter dictionary stored alongside a trained GAN.
///
/// Known entries are typed; anything else found in the dictionary is kept in
/// `extra` so that it survives a load/save cycle and shows up in summaries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GanParams {
    pub x_dim: usize,
    pub z_dim: usize,
    pub keys: Vec<String>,
    #[serde(default)]
    pub constraints: BTreeMap<String, [f64; 2]>,
    #[serde(deserialize_with = "deserialize_feature_row")]
    pub x_mean: Vec<f64>,
    #[serde(deserialize_with = "deserialize_feature_row")]
    pub x_std: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g_dim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g_layers: Option<usize>,
    #[serde(rename = "start date", default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(rename = "end date", default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_gpu: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// Statistics are written either flat or as a single (1, x_dim) row.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureRow {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

fn deserialize_feature_row<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match FeatureRow::deserialize(deserializer)? {
        FeatureRow::Flat(v) => Ok(v),
        FeatureRow::Nested(rows) => {
            if rows.len() != 1 {
                return Err(serde::de::Error::custom(format!(
                    "expected a single row of feature statistics, found {} rows",
                    rows.len()
                )));
            }
            Ok(rows.into_iter().next().unwrap_or_default())
        }
    }
}

impl GanParams {
    pub fn load(config_path: &str) -> GanResult<Self> {
        if !Path::new(config_path).exists() {
            return Err(GanError::InvalidParams(format!(
                "Params file not found at: {}",
                config_path
            )));
        }

        let mut file = File::open(config_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let params = Self::from_json(&contents)?;
        Ok(params)
    }

    pub fn from_json(contents: &str) -> GanResult<Self> {
        let params: GanParams = serde_json::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> GanResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> GanResult<()> {
        if self.x_dim == 0 || self.z_dim == 0 {
            return Err(GanError::InvalidParams(format!(
                "x_dim ({}) and z_dim ({}) must be positive",
                self.x_dim, self.z_dim
            )));
        }
        if self.keys.len() != self.x_dim {
            return Err(GanError::InvalidParams(format!(
                "{} keys given for x_dim {}",
                self.keys.len(),
                self.x_dim
            )));
        }
        if self.x_mean.len() != self.x_dim || self.x_std.len() != self.x_dim {
            return Err(GanError::InvalidParams(format!(
                "x_mean ({}) and x_std ({}) must both have x_dim ({}) entries",
                self.x_mean.len(),
                self.x_std.len(),
                self.x_dim
            )));
        }
        Ok(())
    }

    /// Feature index of `key` in `keys`.
    pub fn key_index(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// All entries as a flat name → value table, sorted by name.
    pub fn entries(&self) -> GanResult<Vec<(String, Value)>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Err(GanError::InvalidParams("params did not serialize to a map".to_string())),
        }
    }
}
