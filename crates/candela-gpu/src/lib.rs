//! Vulkan abstraction layer for the Candela engine.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Lock-serialized queue submission and presentation
//! - Pooled submit contexts and per-thread command buffers
//! - Swapchain lifecycle with acquire/present recovery
//! - Declarative render pass planning and framebuffers
//! - Shader container loading and pipeline creation

pub mod capabilities;
pub mod command;
pub mod debug;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod instance;
pub mod layout;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod renderpass;
pub mod resources;
pub mod shader;
pub mod submit;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use candela_core::constants::MAX_FRAMES;

pub use capabilities::{DeviceInfo, DeviceLimits, GpuVendor};
pub use command::{CommandPool, PoolId, TrackedCommandBuffer};
pub use device::{GraphicsDevice, GraphicsDeviceBuilder, GraphicsEvents};
pub use error::{GpuError, Result};
pub use framebuffer::Framebuffers;
pub use layout::{BindingLayout, ShaderLayout};
pub use memory::{GpuAllocator, GpuImage};
pub use pipeline::{GraphicsPipeline, PipelineConfig};
pub use queue::DeviceQueue;
pub use renderpass::{AttachmentDesc, AttachmentUse, PassPlan, RenderPass, TargetKind};
pub use resources::ResourceManager;
pub use shader::{
    BindingKind, BindingNamespace, ShaderContainer, ShaderModules, ShaderReflection, ShaderStage,
    StageFlags,
};
pub use submit::{SubmitContext, SubmitPool, SubmitState};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::FrameSync;
