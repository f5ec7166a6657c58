//! Candela Engine Demo
//!
//! Clears the window with an animated color through the engine's window
//! render pass, exercising device selection, swapchain recovery and the
//! frame loop end to end.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p candela-demo
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use candela_app::{run_app, AppConfig};

use crate::app::ClearDemo;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    run_app::<ClearDemo>(
        AppConfig::new("Candela Engine - Clear Demo")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(true),
    )
}
