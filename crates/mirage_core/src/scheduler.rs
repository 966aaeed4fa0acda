//! Render Loop Scheduler - one explicit tick per display frame
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          TICK TIMELINE                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  Phase 1 ├── Poll queued PoseBatches from TrackingSession       │
//! │          │   └── PlacementController → AnchorRegistry           │
//! │                                                                 │
//! │  Phase 2 ├── Apply anchor transforms to attached content        │
//! │          │   ├── Tracked / frozen surface: compose + animate    │
//! │          │   └── Lost / not placed: hide                        │
//! │                                                                 │
//! │  Phase 3 ├── FrameRenderer::render → FrameAck                   │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every batch queued since the previous tick goes through placement, in
//! arrival order, before any transform is applied. The
//! scheduler has no stop condition of its own: once the session stops,
//! `tick()` tears down anchors and content and reports
//! [`TickOutcome::SessionEnded`].

use std::time::Instant;

use mirage_shared::AnchorKey;
use serde::Deserialize;

use crate::content::{ContentId, ContentSpec, ContentStore};
use crate::catalog::TargetCatalog;
use crate::engine::{
    CameraDevice, CameraPermission, SessionConfig, SessionEpoch, TrackingEngine,
};
use crate::error::SessionResult;
use crate::placement::{PlacementController, PlacementReport, PoseValidation};
use crate::registry::{AnchorRegistry, AnchorTimestamp};
use crate::render::{FrameAck, FrameRenderer, RenderFrame};
use crate::session::TrackingSession;

/// Configuration for the scheduler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderLoopConfig {
    /// Display refresh rate the driver targets. 0 means unthrottled.
    pub target_fps: u32,
    /// Tick time above which a warning is logged (microseconds).
    pub frame_budget_us: u32,
    /// Spin applied by [`RenderLoopScheduler::attach_spinning`].
    pub spin_radians_per_tick: f32,
}

impl Default for RenderLoopConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            frame_budget_us: 16_666, // ~16ms for 60fps
            spin_radians_per_tick: 0.01,
        }
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameResult {
    /// Tick number within the current session.
    pub frame_number: u64,
    /// True if at least one pose batch was routed through placement.
    pub batch_applied: bool,
    /// Pose batches routed through placement.
    pub batches: u32,
    /// Pose events across those batches.
    pub events_processed: u32,
    /// Registry changes made by this tick.
    pub placement: PlacementReport,
    /// Items drawn.
    pub items_drawn: u32,
    /// Items hidden (anchor lost or not yet placed).
    pub items_hidden: u32,
    /// Renderer acknowledgment.
    pub ack: FrameAck,
    /// Time spent in placement (microseconds).
    pub placement_us: u32,
    /// Time spent applying transforms (microseconds).
    pub transform_us: u32,
    /// Time spent rendering (microseconds).
    pub render_us: u32,
    /// Total tick time (microseconds).
    pub frame_time_us: u32,
    /// Over budget warning.
    pub over_budget: bool,
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A frame was rendered.
    Rendered(FrameResult),
    /// The session is not running; nothing was rendered.
    SessionEnded,
}

impl TickOutcome {
    /// The frame result, if a frame was rendered.
    #[must_use]
    pub fn frame(&self) -> Option<&FrameResult> {
        match self {
            Self::Rendered(result) => Some(result),
            Self::SessionEnded => None,
        }
    }
}

/// Statistics for the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total frames rendered across sessions.
    pub total_frames: u64,
    /// Worst tick time (microseconds).
    pub worst_frame_time_us: u32,
    /// Ticks over budget.
    pub frames_over_budget: u32,
    /// Frame faults recovered.
    pub frame_faults: u64,
    /// Sessions torn down.
    pub sessions_ended: u64,
}

/// Orchestrates session polling, placement, transform application and
/// rendering.
pub struct RenderLoopScheduler<C: CameraDevice, E: TrackingEngine, R: FrameRenderer> {
    config: RenderLoopConfig,
    validation: PoseValidation,
    session: TrackingSession<C, E>,
    registry: AnchorRegistry,
    content: ContentStore,
    placement: Option<PlacementController>,
    renderer: R,
    frame_count: u64,
    live: bool,
    stats: SchedulerStats,
}

impl<C: CameraDevice, E: TrackingEngine, R: FrameRenderer> RenderLoopScheduler<C, E, R> {
    /// Creates a scheduler around an (unstarted) session.
    #[must_use]
    pub fn new(session: TrackingSession<C, E>, renderer: R, config: RenderLoopConfig) -> Self {
        Self {
            config,
            validation: PoseValidation::default(),
            session,
            registry: AnchorRegistry::new(),
            content: ContentStore::new(),
            placement: None,
            renderer,
            frame_count: 0,
            live: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Overrides pose validation tolerances for future sessions.
    #[must_use]
    pub fn with_validation(mut self, validation: PoseValidation) -> Self {
        self.validation = validation;
        self
    }

    /// Forwards the host's camera permission to the session.
    pub fn set_camera_permission(&mut self, permission: CameraPermission) {
        self.session.set_camera_permission(permission);
    }

    /// Starts the session and arms placement for its mode.
    ///
    /// Anchors from any earlier session are gone before the first tick.
    ///
    /// # Errors
    ///
    /// Whatever [`TrackingSession::start`] reports; the scheduler is left
    /// idle.
    pub fn start(&mut self, config: SessionConfig) -> SessionResult<SessionEpoch> {
        if self.live && !self.session.is_running() {
            self.end_session();
        }
        let mode = config.mode;
        let catalog_len = config.catalog.as_ref().map(TargetCatalog::len);

        let epoch = self.session.start(config)?;
        self.registry.clear();
        self.placement = Some(PlacementController::new(mode, catalog_len, self.validation));
        self.frame_count = 0;
        self.live = true;
        Ok(epoch)
    }

    /// Stops the session and releases anchors and content.
    pub fn stop(&mut self) {
        self.session.stop();
        self.end_session();
    }

    fn end_session(&mut self) {
        if self.live {
            self.stats.sessions_ended += 1;
            tracing::info!(
                "Render loop ended after {} ticks ({} anchors, {} content items released)",
                self.frame_count,
                self.registry.len(),
                self.content.len()
            );
        }
        self.registry.clear();
        self.content.clear();
        self.placement = None;
        self.live = false;
    }

    /// Binds content to an anchor key. Released when the session stops.
    pub fn attach(&mut self, anchor: AnchorKey, spec: ContentSpec) -> ContentId {
        self.content.attach(anchor, spec)
    }

    /// Binds content spinning about its local Y axis at the configured rate.
    pub fn attach_spinning(&mut self, anchor: AnchorKey) -> ContentId {
        let spec = ContentSpec::at_anchor()
            .spinning(mirage_shared::Vec3::Y, self.config.spin_radians_per_tick);
        self.content.attach(anchor, spec)
    }

    /// Executes one tick.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.session.is_running() {
            if self.live {
                self.end_session();
            }
            return TickOutcome::SessionEnded;
        }

        let frame_start = Instant::now();

        // === PHASE 1: Placement ===
        let placement_start = Instant::now();
        let batches = self.session.poll_frames();
        if !self.session.is_running() {
            // Engine fault surfaced while polling.
            self.end_session();
            return TickOutcome::SessionEnded;
        }
        self.frame_count += 1;

        let mut result = FrameResult { frame_number: self.frame_count, ..FrameResult::default() };
        if let Some(placement) = self.placement.as_mut() {
            let now = AnchorTimestamp::now(self.frame_count);
            for batch in &batches {
                let report = placement.process(batch, &mut self.registry, now);
                result.placement.absorb(report);
                result.batches += 1;
                let events = u32::try_from(batch.len()).unwrap_or(u32::MAX);
                result.events_processed = result.events_processed.saturating_add(events);
            }
            result.batch_applied = result.batches > 0;
            self.stats.frame_faults += result.placement.faults.len() as u64;
        }
        let placement_time = placement_start.elapsed();

        // === PHASE 2: Transforms ===
        let transform_start = Instant::now();
        let pass = self.content.apply(&self.registry);
        let transform_time = transform_start.elapsed();

        // === PHASE 3: Render ===
        let render_start = Instant::now();
        let frame = RenderFrame { frame_number: self.frame_count, items: &pass.items };
        let ack = self.renderer.render(&frame);
        let render_time = render_start.elapsed();

        if ack.frame_number != self.frame_count {
            tracing::warn!(
                "Renderer acknowledged frame {} while presenting {}",
                ack.frame_number,
                self.frame_count
            );
        }

        // === PHASE 4: Finalize ===
        let total_us = micros(frame_start.elapsed());
        self.stats.total_frames += 1;
        if total_us > self.stats.worst_frame_time_us {
            self.stats.worst_frame_time_us = total_us;
        }
        let over_budget = total_us > self.config.frame_budget_us;
        if over_budget {
            self.stats.frames_over_budget += 1;
            tracing::warn!(
                "Tick {} exceeded budget: {}us (budget {}us)",
                self.frame_count,
                total_us,
                self.config.frame_budget_us
            );
        }

        result.items_drawn = u32::try_from(pass.items.len()).unwrap_or(u32::MAX);
        result.items_hidden = pass.hidden;
        result.ack = ack;
        result.placement_us = micros(placement_time);
        result.transform_us = micros(transform_time);
        result.render_us = micros(render_time);
        result.frame_time_us = total_us;
        result.over_budget = over_budget;

        tracing::debug!(
            "Tick {}: {} events, {} drawn, {} hidden",
            result.frame_number,
            result.events_processed,
            result.items_drawn,
            result.items_hidden
        );
        TickOutcome::Rendered(result)
    }

    /// True while the session runs (the loop keeps ticking).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.is_running()
    }

    /// The tracking session.
    #[must_use]
    pub fn session(&self) -> &TrackingSession<C, E> {
        &self.session
    }

    /// Anchors of the current session.
    #[must_use]
    pub fn registry(&self) -> &AnchorRegistry {
        &self.registry
    }

    /// Attached content of the current session.
    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Placement controller of the current session.
    #[must_use]
    pub fn placement(&self) -> Option<&PlacementController> {
        self.placement.as_ref()
    }

    /// The renderer.
    #[must_use]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &RenderLoopConfig {
        &self.config
    }

    /// Ticks rendered in the current session.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

fn micros(d: std::time::Duration) -> u32 {
    u32::try_from(d.as_micros()).unwrap_or(u32::MAX)
}
