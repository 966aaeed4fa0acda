//! Host UI boundary.
//!
//! The host only mounts and unmounts the AR surface. It sees a boolean
//! toggle and the start error, never individual anchors.

use mirage_shared::AnchorKey;

use crate::content::ContentSpec;
use crate::engine::{CameraDevice, CameraPermission, SessionConfig, SessionEpoch, TrackingEngine};
use crate::error::SessionResult;
use crate::render::FrameRenderer;
use crate::scheduler::{RenderLoopScheduler, TickOutcome};

/// Content to attach every time a session is entered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContentTemplate {
    /// Anchor key the content follows.
    pub anchor: AnchorKey,
    /// Offset and animation.
    pub spec: ContentSpec,
}

/// An AR surface the host can enter and exit.
pub struct ArSurface<C: CameraDevice, E: TrackingEngine, R: FrameRenderer> {
    scheduler: RenderLoopScheduler<C, E, R>,
    session_config: SessionConfig,
    templates: Vec<ContentTemplate>,
}

impl<C: CameraDevice, E: TrackingEngine, R: FrameRenderer> ArSurface<C, E, R> {
    /// Wraps a scheduler; `session_config` is used on every entry.
    #[must_use]
    pub fn new(scheduler: RenderLoopScheduler<C, E, R>, session_config: SessionConfig) -> Self {
        Self { scheduler, session_config, templates: Vec::new() }
    }

    /// Attaches `spec` to `anchor` on every future entry.
    #[must_use]
    pub fn with_content(mut self, anchor: AnchorKey, spec: ContentSpec) -> Self {
        self.templates.push(ContentTemplate { anchor, spec });
        self
    }

    /// Forwards camera permission to the session.
    pub fn set_camera_permission(&mut self, permission: CameraPermission) {
        self.scheduler.set_camera_permission(permission);
    }

    /// Starts a session and attaches the surface's content.
    ///
    /// # Errors
    ///
    /// The session start error; the surface stays inactive.
    pub fn enter_session(&mut self) -> SessionResult<SessionEpoch> {
        let epoch = self.scheduler.start(self.session_config.clone())?;
        for template in &self.templates {
            self.scheduler.attach(template.anchor, template.spec);
        }
        tracing::info!(
            "AR surface entered: epoch {}, {} content items",
            epoch.0,
            self.templates.len()
        );
        Ok(epoch)
    }

    /// Stops the session. Safe to call when inactive.
    pub fn exit_session(&mut self) {
        if self.scheduler.is_active() {
            tracing::info!("AR surface exited");
        }
        self.scheduler.stop();
    }

    /// True while a session runs.
    #[must_use]
    pub fn is_session_active(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Runs one tick.
    pub fn tick(&mut self) -> TickOutcome {
        self.scheduler.tick()
    }

    /// The scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &RenderLoopScheduler<C, E, R> {
        &self.scheduler
    }

    /// The scheduler, mutably (to attach extra content).
    pub fn scheduler_mut(&mut self) -> &mut RenderLoopScheduler<C, E, R> {
        &mut self.scheduler
    }
}
