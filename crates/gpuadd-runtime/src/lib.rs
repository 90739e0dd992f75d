//! Single-kernel GPU dispatch: element-wise `f32` vector addition.
//!
//! This crate runs one compute kernel, `add_arrays`, on the GPU using `wgpu`
//! as the hardware abstraction layer (Metal on macOS, Vulkan/DX12
//! elsewhere).
//!
//! # Architecture
//!
//! - **Device** - [`ComputeDevice`] is the seam to the GPU framework;
//!   [`WgpuDevice`] implements it
//! - **Shader library** - the bundled WGSL library and kernel lookup by name
//! - **Dispatch** - [`VectorAdder`] owns the pipeline and queue and runs one
//!   blocking dispatch per call
//!
//! # Example
//!
//! ```no_run
//! use gpuadd_runtime::{DeviceOptions, VectorAdder, WgpuDevice};
//!
//! #[pollster::main]
//! async fn main() -> gpuadd_runtime::Result<()> {
//!     let device = WgpuDevice::new(&DeviceOptions::default()).await?;
//!     let mut adder = VectorAdder::new(&device)?;
//!
//!     let sums = adder.add(&[1.0, 2.0, 3.0, 4.0, 5.0], &[1.0, 2.0, 3.0, 4.0, 5.0])?;
//!     assert_eq!(sums, vec![2.0, 4.0, 6.0, 8.0, 10.0]);
//!     Ok(())
//! }
//! ```

mod adder;
mod device;
mod error;
mod grid;
mod library;
mod runtime;

// Public exports
pub use adder::VectorAdder;
pub use device::{BufferInit, ComputeDevice};
pub use error::{Result, RuntimeError};
pub use grid::DispatchGrid;
pub use library::{ADD_KERNEL, KernelFunction, ShaderLibrary, WORKGROUP_SIZE_DEF};
pub use runtime::{DeviceOptions, WgpuBuffer, WgpuDevice, WgpuPipeline, WgpuQueue};
