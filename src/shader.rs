//! Compute kernel loading.
//!
//! The kernel is WGSL with `${NAME}` placeholders for the binding numbers and
//! collection capacities. Loading a kernel:
//!
//! 1. reads the source (embedded in the binary or from a file),
//! 2. substitutes the placeholders from [`template_constants`],
//! 3. parses and validates the result with naga,
//! 4. hands it to the backend to build the compute pipeline.
//!
//! Any failure along the way is a [`RaycastError::KernelLoad`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::{ComputePipelineDescriptor, ComputePipelineHandle, GraphicsBackend};
use crate::error::{RaycastError, RaycastResult};
use crate::pipeline::bindings::template_constants;

/// The ray-cast kernel shipped with the crate
pub const EMBEDDED_KERNEL: &str = include_str!("../shaders/raycast.wgsl");

/// Entry point every kernel must export
pub const KERNEL_ENTRY_POINT: &str = "main";

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unresolved placeholder ${{{0}}}")]
    UnresolvedPlaceholder(String),
    #[error("WGSL parse error:\n{0}")]
    Parse(String),
    #[error("WGSL validation error:\n{0}")]
    Validation(String),
    #[error("missing compute entry point `{0}`")]
    MissingEntryPoint(String),
}

pub type ShaderResult<T> = Result<T, ShaderError>;

/// Where a kernel's source comes from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KernelSourceId {
    #[default]
    Embedded,
    File(PathBuf),
}

impl fmt::Display for KernelSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelSourceId::Embedded => write!(f, "embedded raycast.wgsl"),
            KernelSourceId::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl KernelSourceId {
    pub fn read(&self) -> ShaderResult<String> {
        match self {
            KernelSourceId::Embedded => Ok(EMBEDDED_KERNEL.to_string()),
            KernelSourceId::File(path) => {
                std::fs::read_to_string(path).map_err(|source| ShaderError::Unreadable {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

/// Replace every `${NAME}` with its value, rejecting names that have none
pub fn expand_template(source: &str, constants: &[(&str, String)]) -> ShaderResult<String> {
    let mut expanded = source.to_string();
    for (name, value) in constants {
        expanded = expanded.replace(&format!("${{{name}}}"), value);
    }

    if let Some(start) = expanded.find("${") {
        let rest = &expanded[start + 2..];
        let name = rest.split('}').next().unwrap_or(rest);
        return Err(ShaderError::UnresolvedPlaceholder(name.to_string()));
    }
    Ok(expanded)
}

/// Parse and validate WGSL, requiring a compute entry point named `entry_point`
pub fn validate_wgsl(source: &str, entry_point: &str) -> ShaderResult<()> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| ShaderError::Parse(e.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| ShaderError::Validation(e.emit_to_string(source)))?;

    let has_entry = module
        .entry_points
        .iter()
        .any(|ep| ep.name == entry_point && ep.stage == naga::ShaderStage::Compute);
    if !has_entry {
        return Err(ShaderError::MissingEntryPoint(entry_point.to_string()));
    }
    Ok(())
}

/// Read, expand and validate a kernel without touching the GPU
pub fn prepare_kernel(source_id: &KernelSourceId) -> ShaderResult<String> {
    let source = source_id.read()?;
    let expanded = expand_template(&source, &template_constants())?;
    validate_wgsl(&expanded, KERNEL_ENTRY_POINT)?;
    Ok(expanded)
}

/// Build the compute pipeline for `source_id` on `backend`
pub fn load_kernel<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    source_id: &KernelSourceId,
) -> RaycastResult<ComputePipelineHandle> {
    let kernel_load = |message: String| RaycastError::KernelLoad {
        source_id: source_id.to_string(),
        message,
    };

    let shader = prepare_kernel(source_id).map_err(|e| kernel_load(e.to_string()))?;
    let pipeline = backend
        .create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("Raycast Kernel".to_string()),
            shader,
            entry_point: KERNEL_ENTRY_POINT.to_string(),
        })
        .map_err(|e| kernel_load(e.to_string()))
        .inspect_err(|e| log::error!("{e}"))?;

    log::info!("Loaded kernel {source_id} on {}", backend.name());
    Ok(pipeline)
}
