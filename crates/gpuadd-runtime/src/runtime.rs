//! wgpu device initialization and the production [`ComputeDevice`].

use crate::device::{BufferInit, ComputeDevice};
use crate::error::{Result, RuntimeError};
use crate::grid::DispatchGrid;
use crate::library::KernelFunction;
use wgpu::util::DeviceExt;

/// Adapter selection options.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Backends to consider (Metal, Vulkan, DX12, GL).
    pub backends: wgpu::Backends,

    /// Prefer a discrete or an integrated GPU.
    pub power_preference: wgpu::PowerPreference,

    /// Only accept a software fallback adapter.
    pub force_fallback_adapter: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

/// A GPU device backed by wgpu.
///
/// # Example
/// ```no_run
/// # use gpuadd_runtime::{DeviceOptions, WgpuDevice};
/// #[pollster::main]
/// async fn main() -> gpuadd_runtime::Result<()> {
///     let device = WgpuDevice::new(&DeviceOptions::default()).await?;
///     println!("GPU: {}", device.adapter_info().name);
///     Ok(())
/// }
/// ```
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

impl WgpuDevice {
    /// Initialize a device on the best adapter matching `options`.
    ///
    /// # Errors
    /// Returns an error if no suitable GPU is found or initialization fails.
    pub async fn new(options: &DeviceOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .map_err(|e| RuntimeError::Init(format!("Failed to find suitable GPU adapter: {e}")))?;

        Self::with_adapter(&adapter).await
    }

    /// Blocking variant of [`WgpuDevice::new`].
    pub fn new_blocking(options: &DeviceOptions) -> Result<Self> {
        pollster::block_on(Self::new(options))
    }

    /// Initialize a device on a specific adapter.
    ///
    /// # Errors
    /// Returns an error if device creation fails.
    pub async fn with_adapter(adapter: &wgpu::Adapter) -> Result<Self> {
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| RuntimeError::Init(format!("Failed to create device: {e}")))?;

        let limits = device.limits();
        tracing::info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            max_invocations = limits.max_compute_invocations_per_workgroup,
            "GPU device ready"
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
            limits,
        })
    }

    /// Information about the selected adapter.
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Limits of the created device.
    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Run `f` inside an error scope and return the first captured error.
    ///
    /// Without a scope wgpu reports errors to its uncaptured-error handler,
    /// which panics.
    fn scoped<T>(
        &self,
        filter: wgpu::ErrorFilter,
        f: impl FnOnce() -> T,
    ) -> (T, Option<wgpu::Error>) {
        let scope = self.device.push_error_scope(filter);
        let value = f();
        let error = pollster::block_on(scope.pop());
        (value, error)
    }
}

/// A compiled compute pipeline and its bind group layout.
pub struct WgpuPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    threads_per_group: u32,
}

impl WgpuPipeline {
    /// Thread-group size this pipeline was compiled for.
    pub fn threads_per_group(&self) -> u32 {
        self.threads_per_group
    }
}

/// Submission queue handle.
pub struct WgpuQueue(wgpu::Queue);

/// A storage buffer.
pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

/// Bind group layout entry for a storage buffer at `binding`.
fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl ComputeDevice for WgpuDevice {
    type Pipeline = WgpuPipeline;
    type Queue = WgpuQueue;
    type Buffer = WgpuBuffer;

    fn max_threads_per_group(&self) -> u32 {
        self.limits
            .max_compute_invocations_per_workgroup
            .min(self.limits.max_compute_workgroup_size_x)
    }

    fn max_groups_per_dispatch(&self) -> u32 {
        self.limits.max_compute_workgroups_per_dimension
    }

    fn create_pipeline(
        &self,
        function: &KernelFunction,
        threads_per_group: u32,
    ) -> Result<WgpuPipeline> {
        let module = function.specialize(threads_per_group)?;
        let label = format!("{}_{threads_per_group}", function.name());

        // Binding mismatches and backend compile failures surface here
        let ((pipeline, bind_group_layout), error) =
            self.scoped(wgpu::ErrorFilter::Validation, || {
                let shader_module =
                    self.device
                        .create_shader_module(wgpu::ShaderModuleDescriptor {
                            label: Some(&label),
                            source: wgpu::ShaderSource::Naga(std::borrow::Cow::Owned(module)),
                        });

                // a, b read-only; result read-write
                let bind_group_layout =
                    self.device
                        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                            label: Some(&format!("{label}_layout")),
                            entries: &[
                                storage_entry(0, true),
                                storage_entry(1, true),
                                storage_entry(2, false),
                            ],
                        });

                let pipeline_layout =
                    self.device
                        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                            label: Some(&format!("{label}_pipeline_layout")),
                            bind_group_layouts: &[&bind_group_layout],
                            immediate_size: 0,
                        });

                let pipeline =
                    self.device
                        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                            label: Some(&label),
                            layout: Some(&pipeline_layout),
                            module: &shader_module,
                            entry_point: Some(function.name()),
                            compilation_options: Default::default(),
                            cache: None,
                        });

                (pipeline, bind_group_layout)
            });

        if let Some(e) = error {
            return Err(RuntimeError::PipelineCompilation(format!(
                "Failed to create pipeline '{label}': {e}"
            )));
        }

        tracing::debug!(%label, "compiled compute pipeline");

        Ok(WgpuPipeline {
            pipeline,
            bind_group_layout,
            threads_per_group,
        })
    }

    fn create_queue(&self) -> Result<WgpuQueue> {
        Ok(WgpuQueue(self.queue.clone()))
    }

    fn create_buffer(&self, label: &str, init: BufferInit<'_>) -> Result<WgpuBuffer> {
        let size = init.size();
        let limit = (self.limits.max_storage_buffer_binding_size as u64)
            .min(self.limits.max_buffer_size);

        if size == 0 {
            return Err(RuntimeError::Allocation(format!("Buffer '{label}' has zero size")));
        }
        if size > limit {
            return Err(RuntimeError::Allocation(format!(
                "Buffer '{label}' of {size} bytes exceeds device limit of {limit} bytes"
            )));
        }

        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;

        let (buffer, error) = self.scoped(wgpu::ErrorFilter::OutOfMemory, || match init {
            BufferInit::Data(bytes) => {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(label),
                        contents: bytes,
                        usage,
                    })
            }
            BufferInit::Zeroed(size) => {
                let zeros = vec![0u8; size as usize];
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(label),
                        contents: &zeros,
                        usage,
                    })
            }
        });

        if let Some(e) = error {
            return Err(RuntimeError::Allocation(format!(
                "Failed to allocate buffer '{label}' of {size} bytes: {e}"
            )));
        }

        Ok(WgpuBuffer { buffer, size })
    }

    fn dispatch(
        &self,
        queue: &WgpuQueue,
        pipeline: &WgpuPipeline,
        bindings: &[&WgpuBuffer],
        grid: DispatchGrid,
    ) -> Result<()> {
        if pipeline.threads_per_group != grid.threads_per_group {
            return Err(RuntimeError::Execution(format!(
                "Pipeline compiled for {} threads per group, grid needs {}",
                pipeline.threads_per_group, grid.threads_per_group
            )));
        }

        let entries: Vec<wgpu::BindGroupEntry> = bindings
            .iter()
            .enumerate()
            .map(|(slot, buffer)| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: buffer.buffer.as_entire_binding(),
            })
            .collect();

        let (submission, error) = self.scoped(wgpu::ErrorFilter::Validation, || {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("add_arrays_bind_group"),
                layout: &pipeline.bind_group_layout,
                entries: &entries,
            });

            let mut encoder =
                self.device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("add_arrays_encoder"),
                    });

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("add_arrays_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipeline.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(grid.groups, 1, 1);
            }

            queue.0.submit(std::iter::once(encoder.finish()))
        });

        if let Some(e) = error {
            return Err(RuntimeError::Execution(format!("Dispatch rejected: {e}")));
        }

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: None,
            })
            .map_err(|e| RuntimeError::Execution(format!("GPU poll failed: {e:?}")))?;

        Ok(())
    }

    fn read_buffer(&self, queue: &WgpuQueue, buffer: &WgpuBuffer, out: &mut [u8]) -> Result<()> {
        let size = out.len() as u64;
        if size > buffer.size {
            return Err(RuntimeError::Execution(format!(
                "Cannot read {size} bytes from a {} byte buffer",
                buffer.size
            )));
        }
        if size == 0 {
            return Ok(());
        }

        // Create a staging buffer for readback
        let (staging, error) = self.scoped(wgpu::ErrorFilter::OutOfMemory, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback_staging"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        if let Some(e) = error {
            return Err(RuntimeError::Allocation(format!(
                "Failed to allocate {size} byte readback buffer: {e}"
            )));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_copy"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, size);
        queue.0.submit(std::iter::once(encoder.finish()));

        // Map and read
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| {
                RuntimeError::Execution(format!("GPU poll failed during readback: {e:?}"))
            })?;

        receiver
            .recv()
            .map_err(|e| RuntimeError::Execution(format!("Map recv failed: {e}")))??;

        {
            let data = slice.get_mapped_range();
            out.copy_from_slice(&data);
        }
        staging.unmap();

        Ok(())
    }
}
