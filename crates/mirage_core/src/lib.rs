//! # MIRAGE Core
//!
//! Anchor registry, placement and frame scheduling for camera-based AR:
//! - Marker tracking against a catalog of image targets
//! - One-shot surface hit-test placement
//! - Content bound to anchors, drawn once per display frame
//!
//! ## Architecture Rules
//!
//! 1. **No process-wide state** - sessions are explicitly owned values
//! 2. **Placement before transforms** - a tick routes its batch through
//!    placement before any content moves
//! 3. **Exactly one render per tick** - the scheduler never skips or
//!    doubles a frame
//!
//! ## Example
//!
//! ```rust,ignore
//! use mirage_core::{RenderLoopScheduler, SessionConfig, TrackingSession};
//!
//! let session = TrackingSession::new(camera, engine);
//! let mut scheduler = RenderLoopScheduler::new(session, renderer, Default::default());
//! scheduler.start(SessionConfig::surface_hit_test())?;
//! while let TickOutcome::Rendered(_) = scheduler.tick() {}
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod host;
pub mod placement;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod sim;

pub use catalog::{TargetCatalog, TargetEntry};
pub use config::MirageConfig;
pub use content::{Animation, ContentId, ContentSpec, ContentStore};
pub use engine::{
    CameraDevice, CameraPermission, EngineSignal, FrameSink, SessionConfig, SessionEpoch,
    TrackingEngine, TrackingMode,
};
pub use error::{
    CatalogError, CatalogResult, ConfigError, ConfigResult, FrameFault, SessionError,
    SessionResult,
};
pub use host::ArSurface;
pub use placement::{PlacementController, PlacementReport, PoseValidation};
pub use registry::{Anchor, AnchorRegistry, TrackingState};
pub use render::{DrawItem, FrameAck, FrameRenderer, RenderFrame};
pub use scheduler::{
    FrameResult, RenderLoopConfig, RenderLoopScheduler, SchedulerStats, TickOutcome,
};
pub use session::{SessionSignal, SessionState, TrackingSession};
