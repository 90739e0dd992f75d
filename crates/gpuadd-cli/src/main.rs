//! gpuadd - add two f32 arrays on the GPU and print the sums.

use anyhow::{Context, Result};
use clap::Parser;
use gpuadd_cli::{Args, format_sums, run};
use gpuadd_runtime::WgpuDevice;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (lhs, rhs) = args.operands();

    let device = WgpuDevice::new_blocking(&args.device_options())
        .context("Failed to initialize GPU device")?;
    tracing::info!(
        adapter = %device.adapter_info().name,
        backend = ?device.adapter_info().backend,
        "using GPU"
    );

    let sums = run(&device, &lhs, &rhs).context("GPU vector add failed")?;
    println!("{}", format_sums(&sums));

    Ok(())
}
