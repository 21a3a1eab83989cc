// src/error.rs

use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum GanError {
    Io(io::Error),
    Json(serde_json::Error),
    SafeTensors(safetensors::SafeTensorError),
    Shape(ndarray::ShapeError),
    InvalidParams(String),
    Checkpoint(String),
    ShapeMismatch(String),
    InvalidArgument(String),
    AcceleratorUnavailable,
}

impl fmt::Display for GanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GanError::Io(e) => write!(f, "IO error: {}", e),
            GanError::Json(e) => write!(f, "JSON error: {}", e),
            GanError::SafeTensors(e) => write!(f, "SafeTensors error: {}", e),
            GanError::Shape(e) => write!(f, "Array shape error: {}", e),
            GanError::InvalidParams(s) => write!(f, "Invalid parameters: {}", s),
            GanError::Checkpoint(s) => write!(f, "Checkpoint error: {}", s),
            GanError::ShapeMismatch(s) => write!(f, "Shape mismatch: {}", s),
            GanError::InvalidArgument(s) => write!(f, "Invalid argument: {}", s),
            GanError::AcceleratorUnavailable => write!(f, "Error GPU mode not available"),
        }
    }
}

impl Error for GanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GanError::Io(e) => Some(e),
            GanError::Json(e) => Some(e),
            GanError::SafeTensors(e) => Some(e),
            GanError::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GanError {
    fn from(err: io::Error) -> Self {
        GanError::Io(err)
    }
}

impl From<serde_json::Error> for GanError {
    fn from(err: serde_json::Error) -> Self {
        GanError::Json(err)
    }
}

impl From<safetensors::SafeTensorError> for GanError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        GanError::SafeTensors(err)
    }
}

impl From<ndarray::ShapeError> for GanError {
    fn from(err: ndarray::ShapeError) -> Self {
        GanError::Shape(err)
    }
}

pub type GanResult<T> = Result<T, GanError>;
