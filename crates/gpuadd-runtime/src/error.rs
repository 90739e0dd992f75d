//! Error types for the runtime crate.

use thiserror::Error;

/// Errors raised while setting up or running the add kernel.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// GPU initialization failed.
    #[error("GPU initialization failed: {0}")]
    Init(String),

    /// The shader library could not be found.
    #[error("Shader library not found: {0}")]
    LibraryNotFound(String),

    /// The shader library was found but could not be parsed.
    #[error("Failed to load shader library '{label}': {reason}")]
    LibraryLoad { label: String, reason: String },

    /// No compute entry point with the requested name exists in the library.
    #[error("Kernel function '{name}' not found in library '{library}'")]
    FunctionNotFound { name: String, library: String },

    /// Specializing, validating or creating the compute pipeline failed.
    #[error("Pipeline compilation failed: {0}")]
    PipelineCompilation(String),

    /// Buffer allocation failed.
    #[error("Buffer allocation failed: {0}")]
    Allocation(String),

    /// The dispatch grid does not fit in the device's workgroup limits.
    #[error("Dispatch of {groups} workgroups exceeds device limit of {limit}")]
    DispatchTooLarge { groups: u64, limit: u32 },

    /// Input and output lengths disagree.
    #[error("Length mismatch: {0}")]
    LengthMismatch(String),

    /// Submission, wait or readback failed.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Mapping a buffer for readback failed.
    #[error("Buffer async error: {0}")]
    BufferAsync(#[from] wgpu::BufferAsyncError),
}

/// Specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
