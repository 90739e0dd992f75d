//! The vector-add dispatcher.

use crate::device::{BufferInit, ComputeDevice};
use crate::error::{Result, RuntimeError};
use crate::grid::DispatchGrid;
use crate::library::{ADD_KERNEL, KernelFunction, ShaderLibrary};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Adds two `f32` arrays element-wise with one GPU kernel dispatch.
///
/// Owns the compiled `add_arrays` pipeline and a command queue for its whole
/// lifetime; borrows the device, which must outlive it. Each call allocates
/// three transient buffers (a, b, result) that are released before the call
/// returns, on success and on every error path.
///
/// Calls take `&mut self`: one dispatch is in flight at a time and calls on
/// the same adder are serialized.
///
/// # Example
/// ```no_run
/// # use gpuadd_runtime::{DeviceOptions, VectorAdder, WgpuDevice};
/// # fn main() -> gpuadd_runtime::Result<()> {
/// let device = WgpuDevice::new_blocking(&DeviceOptions::default())?;
/// let mut adder = VectorAdder::new(&device)?;
/// let sums = adder.add(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0])?;
/// assert_eq!(sums, vec![5.0, 7.0, 9.0]);
/// # Ok(())
/// # }
/// ```
pub struct VectorAdder<'d, D: ComputeDevice> {
    device: &'d D,

    /// Kernel retained for thread-group specializations.
    function: KernelFunction,

    max_threads_per_group: u32,

    /// Pipeline compiled at `max_threads_per_group`.
    pipeline: D::Pipeline,

    /// Pipelines for grids clamped below the maximum, keyed by
    /// thread-group size. Created on first use.
    specializations: HashMap<u32, D::Pipeline>,

    queue: D::Queue,
}

impl<'d, D: ComputeDevice> VectorAdder<'d, D> {
    /// Build an adder from the bundled shader library.
    ///
    /// # Errors
    /// Fails if the library cannot be loaded, has no `add_arrays` kernel,
    /// or the pipeline or queue cannot be created.
    pub fn new(device: &'d D) -> Result<Self> {
        let library = ShaderLibrary::bundled()?;
        Self::with_library(device, &library)
    }

    /// Build an adder from a caller-supplied shader library.
    ///
    /// The library must contain a compute kernel named `add_arrays` taking
    /// three `f32` storage arrays at bindings 0, 1 (inputs) and 2 (output).
    #[tracing::instrument(skip_all, fields(library = library.label()))]
    pub fn with_library(device: &'d D, library: &ShaderLibrary) -> Result<Self> {
        let function = library.function(ADD_KERNEL)?;
        let max_threads_per_group = device.max_threads_per_group().max(1);

        let pipeline = device.create_pipeline(&function, max_threads_per_group)?;
        let queue = device.create_queue()?;

        tracing::debug!(max_threads_per_group, "vector adder ready");

        Ok(Self {
            device,
            function,
            max_threads_per_group,
            pipeline,
            specializations: HashMap::new(),
            queue,
        })
    }

    /// Return `a[i] + b[i]` for every index.
    ///
    /// # Errors
    /// Returns [`RuntimeError::LengthMismatch`] if `a` and `b` differ in
    /// length, or any allocation/dispatch error from [`Self::add_into`].
    pub fn add(&mut self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        if a.len() != b.len() {
            return Err(RuntimeError::LengthMismatch(format!(
                "inputs have {} and {} elements",
                a.len(),
                b.len()
            )));
        }

        let mut result = vec![0.0; a.len()];
        self.add_into(a, b, &mut result)?;
        Ok(result)
    }

    /// Write `a[i] + b[i]` into `result[i]` for `i < result.len()`.
    ///
    /// `a` and `b` must hold at least `result.len()` elements; extra
    /// elements are ignored. An empty `result` dispatches nothing.
    #[tracing::instrument(skip_all, fields(length = result.len()))]
    pub fn add_into(&mut self, a: &[f32], b: &[f32], result: &mut [f32]) -> Result<()> {
        let length = result.len();
        if a.len() < length || b.len() < length {
            return Err(RuntimeError::LengthMismatch(format!(
                "need {length} elements per input, got {} and {}",
                a.len(),
                b.len()
            )));
        }

        let Some(grid) = DispatchGrid::for_length(
            length,
            self.max_threads_per_group,
            self.device.max_groups_per_dispatch(),
        )?
        else {
            tracing::debug!("empty input, nothing to dispatch");
            return Ok(());
        };

        let byte_len = (length as u64)
            .checked_mul(std::mem::size_of::<f32>() as u64)
            .ok_or_else(|| {
                RuntimeError::Allocation(format!("{length} elements overflow a buffer size"))
            })?;

        let device = self.device;
        let pipeline = if grid.threads_per_group == self.max_threads_per_group {
            &self.pipeline
        } else {
            match self.specializations.entry(grid.threads_per_group) {
                Entry::Occupied(entry) => &*entry.into_mut(),
                Entry::Vacant(entry) => {
                    tracing::debug!(
                        threads_per_group = grid.threads_per_group,
                        "specializing pipeline for clamped thread-group size"
                    );
                    let pipeline =
                        device.create_pipeline(&self.function, grid.threads_per_group)?;
                    &*entry.insert(pipeline)
                }
            }
        };

        tracing::debug!(
            threads = grid.threads,
            threads_per_group = grid.threads_per_group,
            groups = grid.groups,
            "dispatching"
        );

        let a_buffer =
            device.create_buffer("a", BufferInit::Data(bytemuck::cast_slice(&a[..length])))?;
        let b_buffer =
            device.create_buffer("b", BufferInit::Data(bytemuck::cast_slice(&b[..length])))?;
        let result_buffer = device.create_buffer("result", BufferInit::Zeroed(byte_len))?;

        device.dispatch(
            &self.queue,
            pipeline,
            &[&a_buffer, &b_buffer, &result_buffer],
            grid,
        )?;
        device.read_buffer(&self.queue, &result_buffer, bytemuck::cast_slice_mut(result))?;

        Ok(())
    }

    /// Largest thread-group size the main pipeline was compiled for.
    pub fn max_threads_per_group(&self) -> u32 {
        self.max_threads_per_group
    }

    /// Name of the kernel this adder dispatches.
    pub fn kernel_name(&self) -> &str {
        self.function.name()
    }

    /// Number of clamped-size pipelines compiled so far.
    pub fn cached_pipelines(&self) -> usize {
        self.specializations.len()
    }
}
