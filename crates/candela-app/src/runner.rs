//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use candela_core::Version;
use candela_gpu::command::{begin_command_buffer, end_command_buffer};
use candela_gpu::GraphicsDeviceBuilder;
use candela_platform::PlatformConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use crate::app::CandelaApp;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Application version reported to the driver.
    pub version: Version,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Candela Engine".to_string(),
            width: 1280,
            height: 720,
            version: Version::new(0, 1, 0),
            target_fps: None,
            vsync: true,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the application version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Run a `CandelaApp` with the given configuration.
///
/// This function initializes logging, creates the window and graphics
/// device, and runs the event loop until the application exits.
pub fn run_app<A: CandelaApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    event_loop.run_app(&mut runner)?;

    Ok(())
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner<A: CandelaApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

/// Internal application state.
struct AppState<A: CandelaApp> {
    ctx: AppContext,
    app: A,
    target_frame_time: Option<Duration>,
}

impl<A: CandelaApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e}");
                    }
                    state.ctx.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e}");
                    }
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            state.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: CandelaApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        // Create window
        let platform = PlatformConfig {
            title: self.config.title.clone(),
            width: self.config.width,
            height: self.config.height,
            resizable: true,
        };
        let window = Arc::new(event_loop.create_window(platform.window_attributes())?);

        // Create the graphics device
        let device = GraphicsDeviceBuilder::new()
            .app_name(&self.config.title)
            .app_version(self.config.version)
            .validation(self.config.validation)
            .build()?;

        info!("GPU: {}", device.info().summary());

        // Create app context
        // SAFETY: The window outlives the surface created from it
        let mut ctx = unsafe { AppContext::new(window, device, self.config.vsync)? };

        // Initialize the application
        let app = A::init(&mut ctx)?;

        let target_frame_time = self
            .config
            .target_fps
            .map(|fps| Duration::from_nanos(1_000_000_000 / fps as u64));

        Ok(AppState {
            ctx,
            app,
            target_frame_time,
        })
    }
}

impl<A: CandelaApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        // Calculate delta time
        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;

        // Keep the frame open/close pair balanced even when the body fails
        self.ctx.device.begin_frame();
        let body = self.frame_body(dt);
        let end = self.ctx.device.end_frame();
        body?;
        end?;

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn frame_body(&mut self, dt: f32) -> anyhow::Result<()> {
        // Skip rendering while the window has no area
        // SAFETY: Device is valid
        let ready = unsafe { self.ctx.swapchain.ensure_ready(&self.ctx.device)? };

        // Update the application
        self.app.update(&self.ctx, dt);

        if !ready {
            return Ok(());
        }

        // Pick up swapchain replacements from resizes or presentation
        // SAFETY: No command buffer written this frame references the old
        // framebuffers yet
        unsafe { self.ctx.sync_framebuffers()? };

        let tracked = self.ctx.device.get_command_buffer()?;
        let commands = tracked.handle;

        // SAFETY: The buffer was acquired on this thread for this frame
        if let Err(e) = unsafe { self.record(commands, dt) } {
            self.ctx.device.resources().give_back(tracked);
            return Err(e);
        }

        // SAFETY: Rendering work for the acquired image is fully recorded
        unsafe {
            self.ctx.swapchain.submit_render(&self.ctx.device, vec![tracked])?;
            self.ctx.swapchain.present(&self.ctx.device)?;
        }

        Ok(())
    }

    /// Record the application's frame into `commands`.
    ///
    /// # Safety
    /// The buffer must have been acquired on this thread and not yet begun.
    unsafe fn record(&mut self, commands: vk::CommandBuffer, dt: f32) -> anyhow::Result<()> {
        // SAFETY: Caller guarantees the buffer is ready for recording
        unsafe {
            begin_command_buffer(
                self.ctx.device.device(),
                commands,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )?;
        }

        let image_index = self.ctx.swapchain.current_image();
        let mut frame = FrameContext {
            commands,
            image_index,
            framebuffer: self.ctx.framebuffers.handle(image_index as usize),
            extent: self.ctx.swapchain.extent(),
            dt,
            frame_index: self.ctx.device.frame_index(),
            frame_number: self.ctx.device.frame_count(),
        };

        // Render the frame
        self.app.render(&self.ctx, &mut frame)?;

        // SAFETY: Recording began above
        unsafe { end_command_buffer(self.ctx.device.device(), commands)? };

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        // SAFETY: The rebuild waits for in-flight work internally
        unsafe {
            self.ctx.swapchain.rebuild(&self.ctx.device, width, height)?;
            self.ctx.sync_framebuffers()?;
        }

        // Notify the application
        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self) {
        info!("Starting cleanup...");

        if let Err(e) = self.ctx.device.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        // Let the app cleanup first
        self.app.cleanup(&mut self.ctx);

        // Then tear down context resources; the device itself goes with the
        // context drop
        // SAFETY: The device is idle and no more frames will be recorded
        unsafe { self.ctx.cleanup() };

        info!("Cleanup complete");
    }
}
