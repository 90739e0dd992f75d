//! The GPU framework seam.
//!
//! [`ComputeDevice`] names the handful of primitives the dispatcher needs
//! from a GPU framework: pipeline compilation, queue creation, storage
//! buffers, one blocking dispatch and readback. [`crate::WgpuDevice`] is the
//! production implementation.
//!
//! Every handle is released when dropped, so early returns never leak.

use crate::error::Result;
use crate::grid::DispatchGrid;
use crate::library::KernelFunction;

/// Initial contents of a new storage buffer.
#[derive(Debug, Clone, Copy)]
pub enum BufferInit<'a> {
    /// Copy these bytes into the buffer; the buffer is exactly this size.
    Data(&'a [u8]),

    /// Allocate this many bytes, explicitly zero-filled.
    Zeroed(u64),
}

impl BufferInit<'_> {
    /// Buffer size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            BufferInit::Data(bytes) => bytes.len() as u64,
            BufferInit::Zeroed(size) => *size,
        }
    }
}

/// A device able to run a single compute kernel.
pub trait ComputeDevice {
    /// A compiled kernel, specialized to one thread-group size.
    type Pipeline;

    /// Ordered submission channel.
    type Queue;

    /// A storage buffer visible to both CPU and GPU.
    type Buffer;

    /// Largest thread-group size a 1-D compute pipeline can use.
    fn max_threads_per_group(&self) -> u32;

    /// Largest number of thread groups in one dispatch dimension.
    fn max_groups_per_dispatch(&self) -> u32;

    /// Compile `function` into a pipeline with the given thread-group size.
    fn create_pipeline(
        &self,
        function: &KernelFunction,
        threads_per_group: u32,
    ) -> Result<Self::Pipeline>;

    /// Create a command queue.
    fn create_queue(&self) -> Result<Self::Queue>;

    /// Allocate a storage buffer.
    fn create_buffer(&self, label: &str, init: BufferInit<'_>) -> Result<Self::Buffer>;

    /// Encode one dispatch of `pipeline` over `grid`, with `bindings[i]`
    /// bound at slot `i`, submit it and block until the GPU finishes.
    fn dispatch(
        &self,
        queue: &Self::Queue,
        pipeline: &Self::Pipeline,
        bindings: &[&Self::Buffer],
        grid: DispatchGrid,
    ) -> Result<()>;

    /// Copy the first `out.len()` bytes of `buffer` back to the CPU.
    fn read_buffer(&self, queue: &Self::Queue, buffer: &Self::Buffer, out: &mut [u8])
    -> Result<()>;
}
