//! Common test utilities for dispatcher tests.
//!
//! `CountingDevice` is a CPU stand-in for the GPU framework. It runs the add
//! kernel on the CPU, records every dispatch, and counts live pipelines,
//! queues and buffers so tests can assert that nothing leaks.

#![allow(dead_code)]

use gpuadd_runtime::{
    BufferInit, ComputeDevice, DispatchGrid, KernelFunction, Result, RuntimeError,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Decrements a shared counter when dropped.
struct LiveGuard(Rc<Cell<usize>>);

impl LiveGuard {
    fn new(counter: &Rc<Cell<usize>>) -> Self {
        counter.set(counter.get() + 1);
        Self(Rc::clone(counter))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

pub struct CountingPipeline {
    pub threads_per_group: u32,
    pub entry_point: String,
    _guard: LiveGuard,
}

pub struct CountingQueue {
    _guard: LiveGuard,
}

pub struct CountingBuffer {
    pub label: String,
    data: RefCell<Vec<u8>>,
    _guard: LiveGuard,
}

impl CountingBuffer {
    fn floats(&self) -> Vec<f32> {
        self.data
            .borrow()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

/// Record of one dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub grid: DispatchGrid,
    pub pipeline_threads_per_group: u32,
    pub binding_labels: Vec<String>,
    /// Contents of the result buffer when the dispatch started.
    pub result_before: Vec<f32>,
}

/// Failure injection knobs.
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Fail every pipeline creation.
    pub pipeline: bool,
    /// Fail queue creation.
    pub queue: bool,
    /// Fail the nth buffer allocation (0-based, counted over the device's life).
    pub buffer_at: Option<usize>,
    /// Fail every dispatch.
    pub dispatch: bool,
    /// Fail every readback.
    pub readback: bool,
}

pub struct CountingDevice {
    pub max_threads_per_group: u32,
    pub max_groups: u32,
    pub faults: Faults,
    live_pipelines: Rc<Cell<usize>>,
    live_queues: Rc<Cell<usize>>,
    live_buffers: Rc<Cell<usize>>,
    pipelines_created: Cell<usize>,
    buffers_created: Cell<usize>,
    dispatches: RefCell<Vec<DispatchRecord>>,
}

impl CountingDevice {
    pub fn new(max_threads_per_group: u32) -> Self {
        Self::with_faults(max_threads_per_group, Faults::default())
    }

    pub fn with_faults(max_threads_per_group: u32, faults: Faults) -> Self {
        Self {
            max_threads_per_group,
            max_groups: 65535,
            faults,
            live_pipelines: Rc::new(Cell::new(0)),
            live_queues: Rc::new(Cell::new(0)),
            live_buffers: Rc::new(Cell::new(0)),
            pipelines_created: Cell::new(0),
            buffers_created: Cell::new(0),
            dispatches: RefCell::new(Vec::new()),
        }
    }

    pub fn live_pipelines(&self) -> usize {
        self.live_pipelines.get()
    }

    pub fn live_queues(&self) -> usize {
        self.live_queues.get()
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers.get()
    }

    pub fn pipelines_created(&self) -> usize {
        self.pipelines_created.get()
    }

    pub fn buffers_created(&self) -> usize {
        self.buffers_created.get()
    }

    pub fn dispatches(&self) -> Vec<DispatchRecord> {
        self.dispatches.borrow().clone()
    }
}

impl ComputeDevice for CountingDevice {
    type Pipeline = CountingPipeline;
    type Queue = CountingQueue;
    type Buffer = CountingBuffer;

    fn max_threads_per_group(&self) -> u32 {
        self.max_threads_per_group
    }

    fn max_groups_per_dispatch(&self) -> u32 {
        self.max_groups
    }

    fn create_pipeline(
        &self,
        function: &KernelFunction,
        threads_per_group: u32,
    ) -> Result<CountingPipeline> {
        if self.faults.pipeline {
            return Err(RuntimeError::PipelineCompilation(
                "injected pipeline failure".to_string(),
            ));
        }

        // Run the real specialization and record the size the module declares
        let module = function.specialize(threads_per_group)?;
        let compiled = module
            .entry_points
            .iter()
            .find(|ep| ep.name == function.name())
            .map(|ep| ep.workgroup_size[0])
            .ok_or_else(|| {
                RuntimeError::PipelineCompilation(format!("no entry point '{}'", function.name()))
            })?;

        self.pipelines_created.set(self.pipelines_created.get() + 1);
        Ok(CountingPipeline {
            threads_per_group: compiled,
            entry_point: function.name().to_string(),
            _guard: LiveGuard::new(&self.live_pipelines),
        })
    }

    fn create_queue(&self) -> Result<CountingQueue> {
        if self.faults.queue {
            return Err(RuntimeError::Init("injected queue failure".to_string()));
        }
        Ok(CountingQueue {
            _guard: LiveGuard::new(&self.live_queues),
        })
    }

    fn create_buffer(&self, label: &str, init: BufferInit<'_>) -> Result<CountingBuffer> {
        let index = self.buffers_created.get();
        self.buffers_created.set(index + 1);

        if self.faults.buffer_at == Some(index) {
            return Err(RuntimeError::Allocation(format!(
                "injected failure allocating '{label}'"
            )));
        }

        let data = match init {
            BufferInit::Data(bytes) => bytes.to_vec(),
            BufferInit::Zeroed(size) => vec![0; size as usize],
        };

        Ok(CountingBuffer {
            label: label.to_string(),
            data: RefCell::new(data),
            _guard: LiveGuard::new(&self.live_buffers),
        })
    }

    fn dispatch(
        &self,
        _queue: &CountingQueue,
        pipeline: &CountingPipeline,
        bindings: &[&CountingBuffer],
        grid: DispatchGrid,
    ) -> Result<()> {
        if self.faults.dispatch {
            return Err(RuntimeError::Execution("injected dispatch failure".to_string()));
        }

        if pipeline.threads_per_group != grid.threads_per_group {
            return Err(RuntimeError::Execution(format!(
                "pipeline runs {} threads per group, grid needs {}",
                pipeline.threads_per_group, grid.threads_per_group
            )));
        }

        let [a, b, result] = bindings else {
            return Err(RuntimeError::Execution(format!(
                "expected 3 bindings, got {}",
                bindings.len()
            )));
        };

        self.dispatches.borrow_mut().push(DispatchRecord {
            grid,
            pipeline_threads_per_group: pipeline.threads_per_group,
            binding_labels: bindings.iter().map(|b| b.label.clone()).collect(),
            result_before: result.floats(),
        });

        let a = a.floats();
        let b = b.floats();
        let mut out = result.data.borrow_mut();
        let len = out.len() / 4;

        // One invocation per launched thread, guarded like the WGSL kernel
        for i in 0..grid.launched_threads() as usize {
            if i >= len {
                continue;
            }
            let sum = a[i] + b[i];
            out[i * 4..i * 4 + 4].copy_from_slice(&sum.to_le_bytes());
        }

        Ok(())
    }

    fn read_buffer(
        &self,
        _queue: &CountingQueue,
        buffer: &CountingBuffer,
        out: &mut [u8],
    ) -> Result<()> {
        if self.faults.readback {
            return Err(RuntimeError::Execution("injected readback failure".to_string()));
        }
        let data = buffer.data.borrow();
        out.copy_from_slice(&data[..out.len()]);
        Ok(())
    }
}
