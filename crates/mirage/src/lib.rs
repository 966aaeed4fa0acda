//! # MIRAGE
//!
//! Display-side integration of the anchor subsystem.
//!
//! ```text
//! ┌────────────────┐  tick()   ┌──────────────────────────────────────┐
//! │ DisplayDriver  │─────────> │ RenderLoopScheduler                  │
//! │ (refresh rate) │           │  session → placement → content → ack │
//! └────────────────┘           └──────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `driver`: paces ticks and accumulates frame statistics

pub mod driver;

// Re-export the subsystem
pub use mirage_core as core;
pub use mirage_shared as shared;

pub use driver::{DisplayDriver, DriverExit, FrameStatsAccumulator};
