//! gpuadd CLI library - shared functionality for testing and binary.

use clap::Parser;
use gpuadd_runtime::{ComputeDevice, DeviceOptions, VectorAdder};

/// Left operand used when none is given on the command line.
pub const DEFAULT_LHS: [f32; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];

/// Right operand used when none is given on the command line.
pub const DEFAULT_RHS: [f32; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "gpuadd")]
#[command(about = "Add two f32 arrays element-wise on the GPU", long_about = None)]
#[command(version)]
pub struct Args {
    /// Left operand, comma-separated (defaults to 1,2,3,4,5)
    #[arg(
        short = 'a',
        long = "lhs",
        value_name = "FLOATS",
        value_delimiter = ',',
        allow_hyphen_values = true,
        requires = "rhs"
    )]
    pub lhs: Option<Vec<f32>>,

    /// Right operand, comma-separated (defaults to 1,2,3,4,5)
    #[arg(
        short = 'b',
        long = "rhs",
        value_name = "FLOATS",
        value_delimiter = ',',
        allow_hyphen_values = true,
        requires = "lhs"
    )]
    pub rhs: Option<Vec<f32>>,

    /// GPU backend to use
    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    pub backend: BackendArg,

    /// Adapter power preference
    #[arg(long, value_enum, default_value_t = PowerArg::High)]
    pub power: PowerArg,

    /// Only accept a software fallback adapter
    #[arg(long)]
    pub fallback_adapter: bool,
}

impl Args {
    /// Operands to add, falling back to the built-in example.
    pub fn operands(&self) -> (Vec<f32>, Vec<f32>) {
        match (&self.lhs, &self.rhs) {
            (Some(lhs), Some(rhs)) => (lhs.clone(), rhs.clone()),
            _ => (DEFAULT_LHS.to_vec(), DEFAULT_RHS.to_vec()),
        }
    }

    /// Adapter options selected on the command line.
    pub fn device_options(&self) -> DeviceOptions {
        device_options(self.backend, self.power, self.fallback_adapter)
    }
}

/// GPU backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendArg {
    /// Let wgpu pick from every available backend.
    #[default]
    Auto,
    Metal,
    Vulkan,
    Dx12,
    Gl,
}

impl From<BackendArg> for wgpu::Backends {
    fn from(backend: BackendArg) -> Self {
        match backend {
            BackendArg::Auto => wgpu::Backends::all(),
            BackendArg::Metal => wgpu::Backends::METAL,
            BackendArg::Vulkan => wgpu::Backends::VULKAN,
            BackendArg::Dx12 => wgpu::Backends::DX12,
            BackendArg::Gl => wgpu::Backends::GL,
        }
    }
}

/// Adapter power preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PowerArg {
    #[default]
    High,
    Low,
}

impl From<PowerArg> for wgpu::PowerPreference {
    fn from(power: PowerArg) -> Self {
        match power {
            PowerArg::High => wgpu::PowerPreference::HighPerformance,
            PowerArg::Low => wgpu::PowerPreference::LowPower,
        }
    }
}

/// Build adapter options from command-line choices.
pub fn device_options(backend: BackendArg, power: PowerArg, fallback: bool) -> DeviceOptions {
    DeviceOptions {
        backends: backend.into(),
        power_preference: power.into(),
        force_fallback_adapter: fallback,
    }
}

/// Add `lhs` and `rhs` on `device`.
pub fn run<D: ComputeDevice>(
    device: &D,
    lhs: &[f32],
    rhs: &[f32],
) -> gpuadd_runtime::Result<Vec<f32>> {
    let mut adder = VectorAdder::new(device)?;
    adder.add(lhs, rhs)
}

/// Format sums space-separated, the way `gpuadd` prints them.
pub fn format_sums(sums: &[f32]) -> String {
    sums.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
