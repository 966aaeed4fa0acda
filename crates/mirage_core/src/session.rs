//! # Tracking Session
//!
//! Owns the camera and the tracking engine for the lifetime of one run.
//!
//! ```text
//! Uninitialized ──start()──> Starting ──ok──> Running ──stop()/fault──> Stopped
//!                               │                                        │
//!                               └──────── init failure (rolled back) ────┤
//!                                                                        │
//!                               Starting <────────── start() ────────────┘
//! ```
//!
//! Each successful `start()` opens a fresh frame queue and a new
//! [`SessionEpoch`]. Stopping closes every sink of the run, so frames from
//! a previous run can never leak into the next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use mirage_shared::PoseBatch;
use parking_lot::Mutex;

use crate::catalog::TargetCatalog;
use crate::engine::{
    CameraDevice, CameraPermission, EngineSignal, FrameSink, Overflow, SessionConfig,
    SessionEpoch, TrackingEngine, TrackingMode,
};
use crate::error::{SessionError, SessionResult};

/// Default number of undelivered frames kept per session.
pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 4;

/// Lifecycle of a tracking session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Never started.
    Uninitialized,
    /// Acquiring camera and initializing the engine.
    Starting,
    /// Producing frames.
    Running,
    /// Resources released.
    Stopped,
}

/// State signal exposed across the engine boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionSignal {
    /// Session is producing frames.
    Running,
    /// Session stopped because the engine reported a fatal fault.
    Error,
    /// Session is not running.
    Stopped,
}

/// Frame delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Successful starts.
    pub starts: u64,
    /// Batches surfaced to the caller.
    pub frames_delivered: u64,
    /// Signals evicted from a full queue and folded into an overflow batch.
    pub frames_coalesced: u64,
}

/// Explicitly owned tracking session.
///
/// Generic over the camera and engine so tests and hosts plug in their own.
/// Dropping a session stops it.
pub struct TrackingSession<C: CameraDevice, E: TrackingEngine> {
    camera: C,
    engine: E,
    state: SessionState,
    permission: CameraPermission,
    epoch: SessionEpoch,
    config: Option<SessionConfig>,
    receiver: Option<Receiver<EngineSignal>>,
    overflow: Option<Arc<Mutex<Overflow>>>,
    open: Option<Arc<AtomicBool>>,
    queue_capacity: usize,
    resources_held: bool,
    last_fault: Option<String>,
    stats: SessionStats,
}

impl<C: CameraDevice, E: TrackingEngine> TrackingSession<C, E> {
    /// Creates an uninitialized session. Nothing is acquired until `start()`.
    #[must_use]
    pub fn new(camera: C, engine: E) -> Self {
        Self {
            camera,
            engine,
            state: SessionState::Uninitialized,
            permission: CameraPermission::default(),
            epoch: SessionEpoch::default(),
            config: None,
            receiver: None,
            overflow: None,
            open: None,
            queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY,
            resources_held: false,
            last_fault: None,
            stats: SessionStats::default(),
        }
    }

    /// Sets how many undelivered frames the queue holds (minimum 1).
    /// Applies from the next `start()`.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Updates the camera permission supplied by the host.
    pub fn set_camera_permission(&mut self, permission: CameraPermission) {
        self.permission = permission;
    }

    /// Acquires the camera and initializes the engine.
    ///
    /// Starts a logically new frame sequence; returns its epoch.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyRunning`] if the session is running.
    /// - [`SessionError::DeviceUnavailable`] if permission is denied or the
    ///   camera cannot be acquired.
    /// - [`SessionError::EngineInitFailed`] if the configuration is invalid
    ///   or the engine rejects it. The camera is released before returning.
    pub fn start(&mut self, config: SessionConfig) -> SessionResult<SessionEpoch> {
        if self.state == SessionState::Running {
            return Err(SessionError::AlreadyRunning);
        }
        self.state = SessionState::Starting;
        self.last_fault = None;

        let result = self.acquire(&config);
        match result {
            Ok(()) => {
                tracing::info!(
                    "Tracking session started: {:?}, epoch {}",
                    config.mode,
                    self.epoch.0
                );
                self.config = Some(config);
                self.state = SessionState::Running;
                self.stats.starts += 1;
                Ok(self.epoch)
            }
            Err(err) => {
                tracing::warn!("Tracking session failed to start: {err}");
                self.state = SessionState::Stopped;
                Err(err)
            }
        }
    }

    fn acquire(&mut self, config: &SessionConfig) -> SessionResult<()> {
        validate_config(config)?;

        if self.permission == CameraPermission::Denied {
            return Err(SessionError::DeviceUnavailable("camera permission denied".into()));
        }
        self.camera.acquire().map_err(SessionError::DeviceUnavailable)?;

        let (sender, receiver) = bounded(self.queue_capacity);
        let overflow = Arc::new(Mutex::new(Overflow::default()));
        let open = Arc::new(AtomicBool::new(true));
        let sink =
            FrameSink::new(sender, receiver.clone(), Arc::clone(&overflow), Arc::clone(&open));

        if let Err(reason) = self.engine.initialize(config, sink) {
            // Roll back the partial acquisition.
            open.store(false, Ordering::Release);
            self.camera.release();
            return Err(SessionError::EngineInitFailed(reason));
        }

        self.epoch = SessionEpoch(self.epoch.0 + 1);
        self.receiver = Some(receiver);
        self.overflow = Some(overflow);
        self.open = Some(open);
        self.resources_held = true;
        Ok(())
    }

    /// Releases camera and engine. Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.release_resources() {
            tracing::info!("Tracking session stopped, epoch {}", self.epoch.0);
        }
        if self.state != SessionState::Uninitialized {
            self.state = SessionState::Stopped;
        }
    }

    fn release_resources(&mut self) -> bool {
        if let Some(open) = self.open.take() {
            open.store(false, Ordering::Release);
        }
        self.receiver = None;
        self.overflow = None;
        self.config = None;

        if !self.resources_held {
            return false;
        }
        self.resources_held = false;
        self.engine.shutdown();
        self.camera.release();
        true
    }

    /// Returns every frame produced since the last poll, oldest first.
    ///
    /// Frames evicted from a full queue arrive first, folded into one
    /// batch. A fault reported by the engine stops the session and yields
    /// nothing.
    pub fn poll_frames(&mut self) -> Vec<PoseBatch> {
        let (Some(receiver), Some(overflow)) = (self.receiver.as_ref(), self.overflow.as_ref())
        else {
            return Vec::new();
        };

        let mut frames = Vec::new();
        let fault = {
            // Held while draining so the engine cannot evict mid-drain.
            let mut overflow = overflow.lock();
            let (spilled, mut fault, evicted) = overflow.take();
            self.stats.frames_coalesced += evicted;
            frames.extend(spilled);
            // Bounded so a producer that keeps pushing cannot stall the tick.
            let pending = receiver.len();
            for signal in receiver.try_iter().take(pending) {
                match signal {
                    EngineSignal::Frame(batch) => frames.push(batch),
                    EngineSignal::Fault(reason) => {
                        fault.get_or_insert(reason);
                    }
                }
            }
            fault
        };

        if let Some(reason) = fault {
            tracing::warn!("Tracking engine fault, stopping session: {reason}");
            self.last_fault = Some(reason);
            self.stop();
            return Vec::new();
        }

        self.stats.frames_delivered += frames.len() as u64;
        frames
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// State signal: running, stopped after an engine fault, or stopped.
    #[must_use]
    pub fn signal(&self) -> SessionSignal {
        match self.state {
            SessionState::Running | SessionState::Starting => SessionSignal::Running,
            _ if self.last_fault.is_some() => SessionSignal::Error,
            _ => SessionSignal::Stopped,
        }
    }

    /// True while running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Epoch of the current (or most recent) run.
    #[must_use]
    pub fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    /// Tracking mode of the running session.
    #[must_use]
    pub fn mode(&self) -> Option<TrackingMode> {
        self.config.as_ref().map(|c| c.mode)
    }

    /// Catalog of the running session (marker mode).
    #[must_use]
    pub fn catalog(&self) -> Option<&TargetCatalog> {
        self.config.as_ref().and_then(|c| c.catalog.as_ref())
    }

    /// Reason of the fault that stopped the last run, if any.
    #[must_use]
    pub fn last_fault(&self) -> Option<&str> {
        self.last_fault.as_deref()
    }

    /// Frame delivery counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Camera device.
    #[must_use]
    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Tracking engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<C: CameraDevice, E: TrackingEngine> Drop for TrackingSession<C, E> {
    fn drop(&mut self) {
        self.release_resources();
    }
}

fn validate_config(config: &SessionConfig) -> SessionResult<()> {
    match (config.mode, &config.catalog) {
        (TrackingMode::Marker, None) => Err(SessionError::EngineInitFailed(
            "marker mode requires a target catalog".into(),
        )),
        (TrackingMode::Marker, Some(catalog)) if catalog.is_empty() => Err(
            SessionError::EngineInitFailed("target catalog is empty".into()),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ResourceTracker, ScriptedCamera, ScriptedEngine};
    use mirage_shared::{AnchorKey, Pose, PoseEvent, Vec3};

    fn session(tracker: &ResourceTracker) -> TrackingSession<ScriptedCamera, ScriptedEngine> {
        TrackingSession::new(ScriptedCamera::new(tracker), ScriptedEngine::new(tracker))
    }

    #[test]
    fn test_start_and_stop() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        assert_eq!(s.state(), SessionState::Uninitialized);

        let epoch = s.start(SessionConfig::surface_hit_test()).unwrap();
        assert_eq!(epoch, SessionEpoch(1));
        assert!(s.is_running());
        assert!(tracker.camera_held());
        assert!(tracker.engine_live());

        s.stop();
        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(s.signal(), SessionSignal::Stopped);
        assert!(!tracker.camera_held());
        assert!(!tracker.engine_live());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        s.start(SessionConfig::surface_hit_test()).unwrap();

        s.stop();
        let once = (s.state(), tracker.counts());
        s.stop();
        let twice = (s.state(), tracker.counts());

        assert_eq!(once, twice);
        assert_eq!(twice.1.camera_released, 1);
        assert_eq!(twice.1.engine_shutdowns, 1);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        s.stop();
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert_eq!(tracker.counts().camera_released, 0);
    }

    #[test]
    fn test_denied_permission_never_touches_camera() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        s.set_camera_permission(CameraPermission::Denied);

        let err = s.start(SessionConfig::surface_hit_test()).unwrap_err();
        assert!(matches!(err, SessionError::DeviceUnavailable(_)));
        assert_eq!(tracker.counts().camera_acquired, 0);
        assert!(!s.is_running());
    }

    #[test]
    fn test_busy_camera_reports_device_unavailable() {
        let tracker = ResourceTracker::new();
        let mut s = TrackingSession::new(
            ScriptedCamera::new(&tracker).busy("in use by another app"),
            ScriptedEngine::new(&tracker),
        );
        let err = s.start(SessionConfig::surface_hit_test()).unwrap_err();
        assert_eq!(err, SessionError::DeviceUnavailable("in use by another app".into()));
        assert_eq!(tracker.counts().engine_initialized, 0);
    }

    #[test]
    fn test_engine_rejection_rolls_back_camera() {
        let tracker = ResourceTracker::new();
        let mut s = TrackingSession::new(
            ScriptedCamera::new(&tracker),
            ScriptedEngine::new(&tracker).rejecting("unsupported device"),
        );
        let err = s.start(SessionConfig::surface_hit_test()).unwrap_err();
        assert!(matches!(err, SessionError::EngineInitFailed(_)));
        assert_eq!(tracker.counts().camera_acquired, 1);
        assert_eq!(tracker.counts().camera_released, 1);
        assert!(!tracker.camera_held());
        assert_eq!(s.state(), SessionState::Stopped);

        // Nothing left to release.
        s.stop();
        assert_eq!(tracker.counts().camera_released, 1);
    }

    #[test]
    fn test_marker_mode_without_catalog_fails() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        let config = SessionConfig { mode: TrackingMode::Marker, catalog: None };
        assert!(matches!(s.start(config), Err(SessionError::EngineInitFailed(_))));
        assert_eq!(tracker.counts().camera_acquired, 0);
    }

    #[test]
    fn test_start_twice_rejected() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        s.start(SessionConfig::surface_hit_test()).unwrap();
        assert_eq!(
            s.start(SessionConfig::surface_hit_test()),
            Err(SessionError::AlreadyRunning)
        );
        assert_eq!(tracker.counts().camera_acquired, 1);
    }

    fn hit(x: f32) -> PoseEvent {
        PoseEvent::new(AnchorKey::PrimarySurface, Pose::from_position(Vec3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn test_poll_returns_all_frames_in_order() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        let handle = s.engine().handle();
        s.start(SessionConfig::surface_hit_test()).unwrap();

        assert!(s.poll_frames().is_empty());

        handle.emit(vec![]);
        handle.emit(vec![hit(1.0)]);
        let frames = s.poll_frames();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_empty());
        assert_eq!(frames[1].events, vec![hit(1.0)]);
        assert_eq!(s.stats().frames_delivered, 2);
        assert!(s.poll_frames().is_empty());
    }

    #[test]
    fn test_overflowed_frames_arrive_first() {
        let tracker = ResourceTracker::new();
        let camera = ScriptedCamera::new(&tracker);
        let mut s =
            TrackingSession::new(camera, ScriptedEngine::new(&tracker)).with_queue_capacity(2);
        let handle = s.engine().handle();
        s.start(SessionConfig::surface_hit_test()).unwrap();

        for x in 1..=5u8 {
            handle.emit(vec![hit(f32::from(x))]);
        }
        let frames = s.poll_frames();

        // Frames 1..=3 were evicted and folded; 4 and 5 stayed queued.
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].events, vec![hit(1.0)]);
        assert_eq!(frames[1].events, vec![hit(4.0)]);
        assert_eq!(frames[2].events, vec![hit(5.0)]);
        assert_eq!(s.stats().frames_coalesced, 3);
    }

    #[test]
    fn test_engine_fault_stops_session() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        let handle = s.engine().handle();
        s.start(SessionConfig::surface_hit_test()).unwrap();

        handle.emit(vec![hit(1.0)]);
        handle.fault("tracking lost permanently");
        assert!(s.poll_frames().is_empty());
        assert_eq!(s.signal(), SessionSignal::Error);
        assert_eq!(s.last_fault(), Some("tracking lost permanently"));
        assert!(!tracker.camera_held());
        assert!(!tracker.engine_live());
    }

    #[test]
    fn test_restart_uses_fresh_epoch() {
        let tracker = ResourceTracker::new();
        let mut s = session(&tracker);
        let handle = s.engine().handle();

        s.start(SessionConfig::surface_hit_test()).unwrap();
        let old_sink = handle.sink().unwrap();
        s.stop();

        let epoch = s.start(SessionConfig::surface_hit_test()).unwrap();
        assert_eq!(epoch, SessionEpoch(2));

        // A sink held over from the first run cannot deliver anything.
        assert!(!old_sink.is_open());
        assert!(!old_sink.push_frame(PoseBatch::empty(99)));
        assert!(!old_sink.report_fault("stale"));
        assert!(s.poll_frames().is_empty());
        assert!(s.is_running());
        assert_eq!(s.stats().frames_delivered, 0);
    }

    #[test]
    fn test_drop_releases_resources() {
        let tracker = ResourceTracker::new();
        {
            let mut s = session(&tracker);
            s.start(SessionConfig::surface_hit_test()).unwrap();
        }
        assert!(!tracker.camera_held());
        assert!(!tracker.engine_live());
    }
}
