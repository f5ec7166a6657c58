//! Per-frame context for rendering.

use ash::vk;

/// Context for the frame currently being recorded.
///
/// Provides the command buffer, the acquired swapchain image and the
/// framebuffer bound to it.
pub struct FrameContext {
    /// Command buffer for recording rendering commands.
    pub commands: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// Window-pass framebuffer for the acquired image.
    pub framebuffer: vk::Framebuffer,
    /// Swapchain extent this frame renders at.
    pub extent: vk::Extent2D,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Slot index in the in-flight frame rotation.
    pub frame_index: usize,
    /// Lifetime frame number.
    pub frame_number: u64,
}
