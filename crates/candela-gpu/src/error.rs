//! GPU error types.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Selected GPU is missing a required capability.
    #[error("Device is missing a required capability: {0}")]
    MissingCapability(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// A shader container file could not be loaded.
    #[error("Failed to load shader `{}`: {source}", .path.display())]
    ShaderLoad {
        /// Path of the container file.
        path: PathBuf,
        /// Underlying parse or I/O error.
        #[source]
        source: Box<GpuError>,
    },

    /// A shader container failed validation.
    #[error("Invalid shader container: {0}")]
    InvalidShader(String),

    /// Shader modules disagree about a shared binding slot.
    #[error("Incompatible {stage} module: {reason}")]
    IncompatibleModule {
        /// Stage of the module that introduced the conflict.
        stage: String,
        /// What disagreed.
        reason: String,
    },

    /// Requested multisample count is not available.
    #[error("Sample count {0} is not supported for this pass on the current device")]
    UnsupportedSampleCount(u32),

    /// Requested render target exceeds device framebuffer limits.
    #[error("Render target {width}x{height} exceeds device limit {max_width}x{max_height}")]
    TargetTooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Device maximum framebuffer width.
        max_width: u32,
        /// Device maximum framebuffer height.
        max_height: u32,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

impl From<std::io::Error> for GpuError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(err.to_string())
    }
}
