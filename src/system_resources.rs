use sysinfo::{CpuExt, System, SystemExt};

// sysinfo 0.29 reports memory in bytes.
const BYTES_TO_GB: f32 = 1024.0 * 1024.0 * 1024.0;

/// Snapshot of host capacity, reported next to the device selection.
#[derive(Debug)]
pub struct SystemResources {
    pub cpu_core_count: usize,
    pub cpu_brand: String,
    pub ram_total_gb: f32,
    pub ram_available_gb: f32,
}

impl SystemResources {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        let cpu_core_count = sys.cpus().len();
        let cpu_brand = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .unwrap_or_default();
        let ram_total_gb = sys.total_memory() as f32 / BYTES_TO_GB;
        let ram_available_gb = sys.available_memory() as f32 / BYTES_TO_GB;

        Self {
            cpu_core_count,
            cpu_brand,
            ram_total_gb,
            ram_available_gb,
        }
    }
}

impl Default for SystemResources {
    fn default() -> Self {
        Self::new()
    }
}
