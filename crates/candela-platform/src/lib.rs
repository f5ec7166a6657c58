//! Platform abstraction for the Candela engine.
//!
//! Provides window configuration and monitor queries via winit. The GPU
//! layer never sees winit types; it takes raw window handles through the
//! `raw-window-handle` traits.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::monitor::MonitorHandle;
use winit::window::{Window, WindowAttributes};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Window handle unavailable: {0}")]
    WindowHandle(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Candela Engine".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

impl PlatformConfig {
    /// Window attributes for `ActiveEventLoop::create_window`.
    pub fn window_attributes(&self) -> WindowAttributes {
        Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(self.resizable)
    }
}

/// Get raw handles from a window for Vulkan surface creation.
pub fn raw_handles(
    window: &Window,
) -> Result<(
    raw_window_handle::RawDisplayHandle,
    raw_window_handle::RawWindowHandle,
)> {
    let display = window
        .display_handle()
        .map_err(|e| PlatformError::WindowHandle(e.to_string()))?;
    let handle = window
        .window_handle()
        .map_err(|e| PlatformError::WindowHandle(e.to_string()))?;
    Ok((display.as_raw(), handle.as_raw()))
}

/// Basic description of one attached monitor.
#[derive(Debug, Clone)]
pub struct MonitorInfo {
    pub name: Option<String>,
    pub size: PhysicalSize<u32>,
    pub refresh_rate_millihertz: Option<u32>,
    pub scale_factor: f64,
}

impl From<MonitorHandle> for MonitorInfo {
    fn from(monitor: MonitorHandle) -> Self {
        Self {
            name: monitor.name(),
            size: monitor.size(),
            refresh_rate_millihertz: monitor.refresh_rate_millihertz(),
            scale_factor: monitor.scale_factor(),
        }
    }
}

/// Enumerate the monitors visible to a window.
pub fn available_monitors(window: &Window) -> Vec<MonitorInfo> {
    let monitors: Vec<MonitorInfo> = window.available_monitors().map(MonitorInfo::from).collect();
    tracing::debug!("Found {} monitor(s)", monitors.len());
    monitors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fills_window_attributes() {
        let config = PlatformConfig::default();
        let attrs = config.window_attributes();
        assert_eq!(attrs.title, "Candela Engine");
        assert!(attrs.resizable);
    }
}
