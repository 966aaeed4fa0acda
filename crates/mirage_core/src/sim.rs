//! Scripted camera, engine and renderer.
//!
//! Stand-ins for the platform boundary: tests drive them synchronously, the
//! demo binary drives the engine handle from a worker thread. A shared
//! [`ResourceTracker`] records every acquire/release so resource guarantees
//! can be asserted from outside the session.

use std::sync::Arc;

use mirage_shared::{PoseBatch, PoseEvent};
use parking_lot::Mutex;

use crate::engine::{CameraDevice, FrameSink, SessionConfig, TrackingEngine};
use crate::render::{DrawItem, FrameAck, FrameRenderer, RenderFrame};

/// Acquire/release counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    /// Successful camera acquisitions.
    pub camera_acquired: u32,
    /// Camera releases.
    pub camera_released: u32,
    /// Successful engine initializations.
    pub engine_initialized: u32,
    /// Engine shutdowns.
    pub engine_shutdowns: u32,
}

/// Shared view of resource usage.
#[derive(Clone, Debug, Default)]
pub struct ResourceTracker {
    counts: Arc<Mutex<ResourceCounts>>,
}

impl ResourceTracker {
    /// Creates a tracker with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn counts(&self) -> ResourceCounts {
        *self.counts.lock()
    }

    /// True while the camera is acquired and not yet released.
    #[must_use]
    pub fn camera_held(&self) -> bool {
        let c = self.counts();
        c.camera_acquired > c.camera_released
    }

    /// True while the engine is initialized and not yet shut down.
    #[must_use]
    pub fn engine_live(&self) -> bool {
        let c = self.counts();
        c.engine_initialized > c.engine_shutdowns
    }

    fn update(&self, f: impl FnOnce(&mut ResourceCounts)) {
        f(&mut *self.counts.lock());
    }
}

/// Camera that can be scripted to be busy.
#[derive(Debug)]
pub struct ScriptedCamera {
    tracker: ResourceTracker,
    busy: Option<String>,
}

impl ScriptedCamera {
    /// Available camera reporting to `tracker`.
    #[must_use]
    pub fn new(tracker: &ResourceTracker) -> Self {
        Self { tracker: tracker.clone(), busy: None }
    }

    /// Makes every `acquire` fail with `reason`.
    #[must_use]
    pub fn busy(mut self, reason: impl Into<String>) -> Self {
        self.busy = Some(reason.into());
        self
    }
}

impl CameraDevice for ScriptedCamera {
    fn acquire(&mut self) -> Result<(), String> {
        if let Some(reason) = &self.busy {
            return Err(reason.clone());
        }
        self.tracker.update(|c| c.camera_acquired += 1);
        Ok(())
    }

    fn release(&mut self) {
        self.tracker.update(|c| c.camera_released += 1);
    }
}

#[derive(Debug, Default)]
struct EngineShared {
    sink: Option<FrameSink>,
    next_frame: u64,
}

/// Producer side of a [`ScriptedEngine`]. Cheap to clone, `Send`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedEngineHandle {
    shared: Arc<Mutex<EngineShared>>,
}

impl ScriptedEngineHandle {
    /// Emits one frame with `events`, numbering frames automatically.
    ///
    /// Returns false when no session is running.
    pub fn emit(&self, events: Vec<PoseEvent>) -> bool {
        let mut shared = self.shared.lock();
        let frame = shared.next_frame;
        shared.next_frame += 1;
        match &shared.sink {
            Some(sink) => sink.push_frame(PoseBatch::new(frame, events)),
            None => false,
        }
    }

    /// Emits a prepared batch as-is.
    pub fn emit_batch(&self, batch: PoseBatch) -> bool {
        self.shared.lock().sink.as_ref().is_some_and(|sink| sink.push_frame(batch))
    }

    /// Reports a fatal engine fault.
    pub fn fault(&self, reason: &str) -> bool {
        self.shared.lock().sink.as_ref().is_some_and(|sink| sink.report_fault(reason))
    }

    /// The sink of the current run, if any.
    #[must_use]
    pub fn sink(&self) -> Option<FrameSink> {
        self.shared.lock().sink.clone()
    }
}

/// Engine whose frames come from a [`ScriptedEngineHandle`].
#[derive(Debug)]
pub struct ScriptedEngine {
    tracker: ResourceTracker,
    handle: ScriptedEngineHandle,
    reject: Option<String>,
}

impl ScriptedEngine {
    /// Engine reporting to `tracker`.
    #[must_use]
    pub fn new(tracker: &ResourceTracker) -> Self {
        Self {
            tracker: tracker.clone(),
            handle: ScriptedEngineHandle::default(),
            reject: None,
        }
    }

    /// Makes every `initialize` fail with `reason`.
    #[must_use]
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.reject = Some(reason.into());
        self
    }

    /// Producer handle; grab it before moving the engine into a session.
    #[must_use]
    pub fn handle(&self) -> ScriptedEngineHandle {
        self.handle.clone()
    }
}

impl TrackingEngine for ScriptedEngine {
    fn initialize(&mut self, _config: &SessionConfig, sink: FrameSink) -> Result<(), String> {
        if let Some(reason) = &self.reject {
            return Err(reason.clone());
        }
        let mut shared = self.handle.shared.lock();
        shared.sink = Some(sink);
        shared.next_frame = 0;
        drop(shared);

        self.tracker.update(|c| c.engine_initialized += 1);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.handle.shared.lock().sink = None;
        self.tracker.update(|c| c.engine_shutdowns += 1);
    }
}

/// A frame as the renderer saw it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedFrame {
    /// Tick number.
    pub frame_number: u64,
    /// Items drawn.
    pub items: Vec<DrawItem>,
}

/// Renderer that records every frame.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    frames: Vec<RecordedFrame>,
    keep_last: Option<usize>,
}

impl RecordingRenderer {
    /// Records every frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only the newest `n` frames (long-running drivers).
    #[must_use]
    pub fn keeping_last(n: usize) -> Self {
        Self { frames: Vec::new(), keep_last: Some(n.max(1)) }
    }

    /// Recorded frames, oldest first.
    #[must_use]
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    /// Most recent frame.
    #[must_use]
    pub fn last(&self) -> Option<&RecordedFrame> {
        self.frames.last()
    }
}

impl FrameRenderer for RecordingRenderer {
    fn render(&mut self, frame: &RenderFrame<'_>) -> FrameAck {
        if let Some(limit) = self.keep_last {
            if self.frames.len() >= limit {
                self.frames.remove(0);
            }
        }
        self.frames.push(RecordedFrame {
            frame_number: frame.frame_number,
            items: frame.items.to_vec(),
        });
        FrameAck {
            frame_number: frame.frame_number,
            items_drawn: u32::try_from(frame.items.len()).unwrap_or(u32::MAX),
        }
    }
}
