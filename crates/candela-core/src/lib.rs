//! Core types and events for the Candela engine.
//!
//! This crate provides the foundational pieces shared across the engine:
//! - Typed callback lists for engine events (device discovery, debug messages)
//! - Version type used for application/engine identification

pub mod events;
pub mod version;

pub use events::{
    Callbacks, DebugCategory, DebugMessage, DebugSeverity, DeviceDiscovery, DeviceKind, HandlerId,
};
pub use version::Version;

/// Engine-wide constants
pub mod constants {
    /// Number of frames that may be in flight simultaneously.
    ///
    /// This bounds the frame-index rotation, the per-thread command pool
    /// count, and the delay depth for deferred resource destruction.
    pub const MAX_FRAMES: usize = 3;
}
