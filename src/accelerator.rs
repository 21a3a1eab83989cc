// src/accelerator.rs

use crate::error::{GanError, GanResult};
use crate::generator::Generator;
use crate::system_resources::SystemResources;
use log::{debug, info};
use ndarray::{Array2, ArrayView2};
use std::fmt;
use std::path::Path;

// Represents the computational device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize), // usize is the device ID
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

/// Floating point tensor representation picked at device selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    Float,
    CudaFloat,
}

impl TensorType {
    /// Tensor type matching the `current_gpu` flag recorded by the loader.
    pub fn for_gpu(current_gpu: bool) -> Self {
        if current_gpu {
            TensorType::CudaFloat
        } else {
            TensorType::Float
        }
    }

    pub fn device(&self) -> Device {
        match self {
            TensorType::Float => Device::Cpu,
            TensorType::CudaFloat => Device::Cuda(0),
        }
    }
}

/// Accelerator policy flag: `auto`, `true`, anything else disables the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuMode {
    Auto,
    Required,
    Off,
}

impl GpuMode {
    pub fn from_flag(flag: &str) -> Self {
        match flag {
            "auto" => GpuMode::Auto,
            "true" => GpuMode::Required,
            _ => GpuMode::Off,
        }
    }
}

pub trait AcceleratorProbe {
    fn accelerator_available(&self) -> bool;
}

/// Looks for a loaded NVIDIA driver on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl AcceleratorProbe for SystemProbe {
    fn accelerator_available(&self) -> bool {
        if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
            let visible = visible.trim();
            if visible.is_empty() || visible == "-1" {
                return false;
            }
        }
        Path::new("/proc/driver/nvidia/version").exists() || Path::new("/dev/nvidia0").exists()
    }
}

// Fixed answer, used when the caller already knows what the host has.
impl AcceleratorProbe for bool {
    fn accelerator_available(&self) -> bool {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSelection {
    pub dtype: TensorType,
    pub device: Device,
}

pub fn select_device(
    mode: GpuMode,
    probe: &dyn AcceleratorProbe,
    verbose: bool,
) -> GanResult<DeviceSelection> {
    let available = probe.accelerator_available();
    let mut dtype = TensorType::Float;
    let mut device = if available { Device::Cuda(0) } else { Device::Cpu };

    match mode {
        GpuMode::Auto => {
            if available {
                dtype = TensorType::CudaFloat;
            }
        }
        GpuMode::Required => {
            if !available {
                return Err(GanError::AcceleratorUnavailable);
            }
            dtype = TensorType::CudaFloat;
        }
        GpuMode::Off => device = Device::Cpu,
    }

    if verbose {
        info!("gaga_phsp version {}", env!("CARGO_PKG_VERSION"));
        if device.is_accelerator() {
            info!("GPU is enabled");
        } else {
            info!("CPU only (no GPU)");
        }
        let host = SystemResources::new();
        info!(
            "Host: {} ({} logical cores), {:.1} GB RAM available of {:.1} GB",
            host.cpu_brand, host.cpu_core_count, host.ram_available_gb, host.ram_total_gb
        );
    }
    debug!("Selected device {} with tensor type {:?} (mode {:?})", device, dtype, mode);

    Ok(DeviceSelection { dtype, device })
}

/// Device selection against the real host.
pub fn init_device(mode: GpuMode, verbose: bool) -> GanResult<DeviceSelection> {
    select_device(mode, &SystemProbe, verbose)
}

/// A 2-D batch tagged with the device it logically lives on.
///
/// Arithmetic is carried out by `ndarray` on the host; the tag records where
/// the batch was produced so host conversion stays explicit.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTensor {
    array: Array2<f32>,
    device: Device,
}

impl DeviceTensor {
    pub fn new(array: Array2<f32>, device: Device) -> Self {
        DeviceTensor { array, device }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    pub fn nrows(&self) -> usize {
        self.array.nrows()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.array.view()
    }

    pub fn map_array<F>(self, f: F) -> Self
    where
        F: FnOnce(Array2<f32>) -> Array2<f32>,
    {
        DeviceTensor { array: f(self.array), device: self.device }
    }

    /// Copies the batch back to host memory.
    pub fn into_host(self) -> Array2<f32> {
        self.array
    }
}

// The Accelerator struct: places generators on the selected device
#[derive(Debug)]
pub struct Accelerator {
    selection: DeviceSelection,
}

impl Accelerator {
    pub fn new(selection: DeviceSelection) -> Self {
        Accelerator { selection }
    }

    pub fn current_device(&self) -> Device {
        self.selection.device
    }

    pub fn dtype(&self) -> TensorType {
        self.selection.dtype
    }

    pub fn prepare<G: Generator + ?Sized>(&self, generator: &mut G) -> GanResult<()> {
        if self.selection.device.is_accelerator() {
            generator.to_device(self.selection.device)?;
        }
        Ok(())
    }
}
