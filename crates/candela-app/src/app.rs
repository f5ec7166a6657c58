//! `CandelaApp` trait definition.

use winit::event::{DeviceEvent, DeviceId, WindowEvent};

use crate::context::AppContext;
use crate::frame::FrameContext;

/// Trait for Candela applications.
///
/// Implement this trait to build an application on the engine. The framework
/// handles all boilerplate like window creation, device initialization,
/// swapchain recovery, and event loop handling.
pub trait CandelaApp: Sized {
    /// Initialize the application.
    ///
    /// Called once when the application starts, after the device, window,
    /// swapchain and window render pass have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering, even while the window is
    /// minimized and no frame will be recorded.
    ///
    /// # Arguments
    /// * `ctx` - Application context with device and window access
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Render a frame.
    ///
    /// Called every frame after `update()` while the swapchain is usable.
    /// Record rendering commands into `frame.commands`; the framework owns
    /// image acquisition, queue submission and presentation.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// Handle window resize.
    ///
    /// Called after the framework has rebuilt the swapchain and the window
    /// framebuffers. Recreate any other size-dependent resources here.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Called for each window event. Return `true` if the event was
    /// handled and should not be processed further.
    ///
    /// Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Handle device events (raw input).
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Cleanup resources before shutdown.
    ///
    /// Called when the application is about to exit. The GPU is idle when
    /// this runs, so it is safe to destroy GPU resources.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
