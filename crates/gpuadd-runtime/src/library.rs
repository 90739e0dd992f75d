//! Shader library loading and kernel lookup.
//!
//! A [`ShaderLibrary`] is a WGSL source parsed into a naga module. Kernel
//! functions are found by entry point name and compiled per thread-group size
//! with naga_oil, since WGSL fixes `@workgroup_size` at compile time.

use crate::error::{Result, RuntimeError};
use naga_oil::compose::{Composer, NagaModuleDescriptor, ShaderDefValue};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Name of the add kernel in the bundled library.
pub const ADD_KERNEL: &str = "add_arrays";

/// Shader def carrying the thread-group size into the WGSL source.
pub const WORKGROUP_SIZE_DEF: &str = "WORKGROUP_SIZE";

const BUNDLED_LABEL: &str = "add_arrays.wgsl";
const BUNDLED_SOURCE: &str = include_str!("../shaders/add_arrays.wgsl");

/// Thread-group size used when parsing a library for entry point lookup.
const PROBE_WORKGROUP_SIZE: u32 = 64;

/// A parsed WGSL shader library.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    label: String,
    source: Arc<str>,
    module: naga::Module,
}

impl ShaderLibrary {
    /// The library bundled with this crate, containing [`ADD_KERNEL`].
    pub fn bundled() -> Result<Self> {
        Self::from_wgsl(BUNDLED_LABEL, BUNDLED_SOURCE)
    }

    /// Parse a library from WGSL source.
    ///
    /// The source may reference the `WORKGROUP_SIZE` shader def.
    ///
    /// # Errors
    /// Returns [`RuntimeError::LibraryLoad`] if the source does not parse.
    pub fn from_wgsl(label: &str, source: &str) -> Result<Self> {
        let module = compile_wgsl(label, source, PROBE_WORKGROUP_SIZE).map_err(|reason| {
            RuntimeError::LibraryLoad {
                label: label.to_string(),
                reason,
            }
        })?;

        Ok(Self {
            label: label.to_string(),
            source: Arc::from(source),
            module,
        })
    }

    /// Load a library from a `.wgsl` file on disk.
    ///
    /// # Errors
    /// Returns [`RuntimeError::LibraryNotFound`] if the file does not exist,
    /// or [`RuntimeError::LibraryLoad`] if it cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                RuntimeError::LibraryNotFound(path.display().to_string())
            }
            _ => RuntimeError::LibraryLoad {
                label: path.display().to_string(),
                reason: e.to_string(),
            },
        })?;

        Self::from_wgsl(&path.display().to_string(), &source)
    }

    /// Library label (file name or caller-supplied label).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Names of all compute entry points in the library.
    pub fn function_names(&self) -> Vec<&str> {
        self.module
            .entry_points
            .iter()
            .filter(|ep| ep.stage == naga::ShaderStage::Compute)
            .map(|ep| ep.name.as_str())
            .collect()
    }

    /// Look up a compute kernel by name.
    ///
    /// # Errors
    /// Returns [`RuntimeError::FunctionNotFound`] if no compute entry point
    /// has that name.
    pub fn function(&self, name: &str) -> Result<KernelFunction> {
        let found = self
            .module
            .entry_points
            .iter()
            .any(|ep| ep.name == name && ep.stage == naga::ShaderStage::Compute);

        if !found {
            return Err(RuntimeError::FunctionNotFound {
                name: name.to_string(),
                library: self.label.clone(),
            });
        }

        Ok(KernelFunction {
            library: self.label.clone(),
            name: name.to_string(),
            source: Arc::clone(&self.source),
        })
    }
}

/// A compute kernel located inside a [`ShaderLibrary`].
#[derive(Debug, Clone)]
pub struct KernelFunction {
    library: String,
    name: String,
    source: Arc<str>,
}

impl KernelFunction {
    /// Entry point name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label of the library this function came from.
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Compile this kernel for a concrete thread-group size.
    ///
    /// The returned module is validated and ready to hand to the GPU backend.
    ///
    /// # Errors
    /// Returns [`RuntimeError::PipelineCompilation`] if preprocessing,
    /// parsing or validation fails, or if the kernel hard-codes a different
    /// `@workgroup_size`.
    pub fn specialize(&self, threads_per_group: u32) -> Result<naga::Module> {
        if threads_per_group == 0 {
            return Err(RuntimeError::PipelineCompilation(format!(
                "'{}': thread-group size must be at least 1",
                self.name
            )));
        }

        let label = format!("{}_{threads_per_group}", self.name);
        let module = compile_wgsl(&label, &self.source, threads_per_group)
            .map_err(RuntimeError::PipelineCompilation)?;

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| {
            RuntimeError::PipelineCompilation(format!("Validation failed for '{label}': {e}"))
        })?;

        // A literal @workgroup_size ignores the shader def
        let workgroup_size = module
            .entry_points
            .iter()
            .find(|ep| ep.name == self.name && ep.stage == naga::ShaderStage::Compute)
            .map(|ep| ep.workgroup_size)
            .ok_or_else(|| {
                RuntimeError::PipelineCompilation(format!(
                    "'{label}' has no compute entry point '{}'",
                    self.name
                ))
            })?;

        if workgroup_size != [threads_per_group, 1, 1] {
            return Err(RuntimeError::PipelineCompilation(format!(
                "'{label}' declares workgroup size {workgroup_size:?}, expected [{threads_per_group}, 1, 1]; \
                 use #{{{WORKGROUP_SIZE_DEF}}}"
            )));
        }

        Ok(module)
    }
}

/// Preprocess and parse WGSL with naga_oil.
fn compile_wgsl(
    label: &str,
    source: &str,
    threads_per_group: u32,
) -> std::result::Result<naga::Module, String> {
    let mut composer = Composer::default();

    let shader_defs: HashMap<String, ShaderDefValue> = [(
        WORKGROUP_SIZE_DEF.to_string(),
        ShaderDefValue::UInt(threads_per_group),
    )]
    .into();

    composer
        .make_naga_module(NagaModuleDescriptor {
            source,
            file_path: label,
            shader_defs,
            ..Default::default()
        })
        .map_err(|e| format!("Shader compilation failed for '{label}': {e}"))
}
