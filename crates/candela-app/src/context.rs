//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use candela_gpu::framebuffer::Framebuffers;
use candela_gpu::renderpass::{AttachmentDesc, AttachmentUse, RenderPass, TargetKind};
use candela_gpu::surface::SurfaceContext;
use candela_gpu::swapchain::Swapchain;
use candela_gpu::GraphicsDevice;
use winit::window::Window;

/// Application context shared across all app methods.
///
/// Owns the window, the graphics device, the swapchain and the window
/// render pass with its framebuffers.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// The graphics device.
    pub device: GraphicsDevice,
    /// Swapchain presenting to the window.
    pub swapchain: Swapchain,
    /// Single-subpass pass clearing into the swapchain image.
    pub window_pass: RenderPass,
    /// Window-pass framebuffers, one per swapchain image.
    pub framebuffers: Framebuffers,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// Create a new application context.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        device: GraphicsDevice,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        // SAFETY: Caller guarantees window has valid handles
        let surface = unsafe { SurfaceContext::from_window(&device, window.as_ref())? };

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: Device and surface are valid
        let swapchain = unsafe { Swapchain::new(&device, surface, width, height, vsync)? };

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count()
        );

        let backbuffer = AttachmentDesc::new("backbuffer", swapchain.format().format)
            .preserve(true)
            .uses(vec![AttachmentUse::Output]);
        // SAFETY: Device is valid
        let mut window_pass =
            unsafe { RenderPass::new(&device, vec![backbuffer], TargetKind::Window)? };

        // SAFETY: Device, pass and swapchain are valid
        let framebuffers = unsafe {
            Framebuffers::new(
                &device,
                &mut window_pass,
                swapchain.extent(),
                1,
                Some(&swapchain),
            )?
        };

        Ok(Self {
            window,
            device,
            swapchain,
            window_pass,
            framebuffers,
            last_frame_time: Instant::now(),
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Get the swapchain width.
    pub fn width(&self) -> u32 {
        self.swapchain.extent().width
    }

    /// Get the swapchain height.
    pub fn height(&self) -> u32 {
        self.swapchain.extent().height
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent().width as f32 / self.swapchain.extent().height as f32
    }

    /// Rebuild the window framebuffers if the swapchain they were built
    /// against has been replaced.
    ///
    /// Returns `true` when a rebuild happened.
    ///
    /// # Safety
    /// The framebuffers must not be referenced by an unsubmitted command
    /// buffer.
    pub(crate) unsafe fn sync_framebuffers(&mut self) -> anyhow::Result<bool> {
        if self.framebuffers.chain_generation() == self.swapchain.generation() {
            return Ok(false);
        }

        let samples = self.framebuffers.samples();
        // SAFETY: Caller guarantees the framebuffers are not in use
        unsafe {
            self.framebuffers.rebuild(
                &self.device,
                &mut self.window_pass,
                self.swapchain.extent(),
                samples,
                Some(&self.swapchain),
            )?;
        }

        tracing::debug!(
            "Window framebuffers rebuilt for swapchain generation {}",
            self.swapchain.generation()
        );
        Ok(true)
    }

    /// Cleanup all resources. The device itself is torn down when the
    /// context is dropped.
    ///
    /// # Safety
    /// All recorded work must have been submitted.
    pub(crate) unsafe fn cleanup(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait idle: {e}");
        }

        // SAFETY: The device is idle
        unsafe {
            self.framebuffers.destroy(&self.device);
            self.window_pass.destroy(&self.device);
            self.swapchain.destroy(&self.device);
        }
    }
}
