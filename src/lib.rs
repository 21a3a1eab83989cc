// Phase space GAN utilities: checkpoints, batched generation and evaluation metrics.

pub mod accelerator;
pub mod checkpoint;
pub mod config;
pub mod constraints;
pub mod error;
pub mod generator;
pub mod history;
pub mod metrics;
pub mod phsp_io;
pub mod runtime_interface;
pub mod sampling;
pub mod system_resources;

pub use checkpoint::{load, save, LoadedGan};
pub use config::GanParams;
pub use error::{GanError, GanResult};
pub use generator::{Generator, MlpGenerator};
pub use sampling::{generate_samples, GenerateOptions, GeneratedSamples};
