//! Application framework for the Candela engine.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and management
//! - Graphics device initialization
//! - Swapchain creation, recovery and recreation
//! - Frame pacing and the begin/end frame protocol
//! - Event loop handling
//!
//! # Example
//!
//! ```no_run
//! use candela_app::{AppConfig, AppContext, CandelaApp, FrameContext, run_app};
//!
//! struct MyApp {
//!     // Application state
//! }
//!
//! impl CandelaApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp {})
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {
//!         // Update logic
//!     }
//!
//!     fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
//!         // Record rendering commands
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;

pub use app::CandelaApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};

// Re-export the winit event types used in the `CandelaApp` trait so apps
// don't need a direct winit dependency.
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
