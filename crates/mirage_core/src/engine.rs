//! Camera & Tracking Engine Boundary
//!
//! The engine does the recognition and sensor fusion; this crate only
//! consumes what it reports. Engines may produce frames on their own thread:
//! they push into a [`FrameSink`] and the session drains it at tick
//! boundaries.
//!
//! ```text
//! ┌──────────────┐  EngineSignal   ┌──────────────┐  poll_frames() ┌───────────┐
//! │    Engine    │───────────────> │ bounded chan │ ─────────────> │  Session  │
//! │ (any thread) │   FrameSink     │  + overflow  │  tick boundary │           │
//! └──────────────┘                 └──────────────┘                └───────────┘
//! ```
//!
//! A full queue evicts its oldest signal into an overflow slot instead of
//! dropping it. Evicted frames are folded into one batch that keeps the
//! first event per anchor key, so the first surface hit after start always
//! reaches placement. An evicted fault is never lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use mirage_shared::PoseBatch;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::catalog::TargetCatalog;

/// Which tracking pipeline the engine runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Content locked to recognized image targets.
    Marker,
    /// Content planted once on the first detected surface hit.
    #[default]
    SurfaceHitTest,
}

/// Configuration handed to [`TrackingSession::start`](crate::TrackingSession::start).
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Tracking pipeline.
    pub mode: TrackingMode,
    /// Targets to recognize (marker mode only).
    pub catalog: Option<TargetCatalog>,
}

impl SessionConfig {
    /// Marker tracking against `catalog`.
    #[must_use]
    pub fn marker(catalog: TargetCatalog) -> Self {
        Self { mode: TrackingMode::Marker, catalog: Some(catalog) }
    }

    /// Surface hit-test placement.
    #[must_use]
    pub fn surface_hit_test() -> Self {
        Self { mode: TrackingMode::SurfaceHitTest, catalog: None }
    }
}

/// Camera permission as reported by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CameraPermission {
    /// User granted access.
    Granted,
    /// User denied access; acquisition is not attempted.
    Denied,
    /// Not asked yet; acquisition may prompt.
    #[default]
    Undetermined,
}

/// Identifies one `start()`..`stop()` run of a session.
///
/// Every successful start gets a new one. Sinks handed out by earlier runs
/// are closed and refuse frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionEpoch(pub u64);

/// Message from engine to session.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineSignal {
    /// One camera frame's pose events.
    Frame(PoseBatch),
    /// Unrecoverable tracking failure, with the engine's reason.
    Fault(String),
}

/// Signals evicted from a full queue, folded together.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Overflow {
    batch: Option<PoseBatch>,
    fault: Option<String>,
    evicted: u64,
}

impl Overflow {
    fn absorb(&mut self, signal: EngineSignal) {
        self.evicted += 1;
        match signal {
            EngineSignal::Frame(batch) => match &mut self.batch {
                None => self.batch = Some(batch),
                Some(kept) => {
                    for event in batch.events {
                        if !kept.events.iter().any(|e| e.key == event.key) {
                            kept.events.push(event);
                        }
                    }
                }
            },
            EngineSignal::Fault(reason) => {
                self.fault.get_or_insert(reason);
            }
        }
    }

    /// Empties the slot, returning the folded batch, the first evicted
    /// fault and the number of evicted signals.
    pub(crate) fn take(&mut self) -> (Option<PoseBatch>, Option<String>, u64) {
        let taken = std::mem::take(self);
        (taken.batch, taken.fault, taken.evicted)
    }
}

/// Engine-side end of the frame queue.
///
/// Cloneable and `Send`: hand it to whatever thread produces frames.
#[derive(Clone, Debug)]
pub struct FrameSink {
    sender: Sender<EngineSignal>,
    // Kept so a full queue can evict its oldest signal.
    evict: Receiver<EngineSignal>,
    overflow: Arc<Mutex<Overflow>>,
    open: Arc<AtomicBool>,
}

impl FrameSink {
    pub(crate) fn new(
        sender: Sender<EngineSignal>,
        evict: Receiver<EngineSignal>,
        overflow: Arc<Mutex<Overflow>>,
        open: Arc<AtomicBool>,
    ) -> Self {
        Self { sender, evict, overflow, open }
    }

    /// False once the owning session has stopped.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Pushes a frame. When the queue is full the oldest queued signal moves
    /// to the overflow slot.
    ///
    /// Returns false once the session has stopped.
    pub fn push_frame(&self, batch: PoseBatch) -> bool {
        self.send(EngineSignal::Frame(batch))
    }

    /// Reports a fatal tracking failure.
    ///
    /// Returns false once the session has stopped.
    pub fn report_fault(&self, reason: impl Into<String>) -> bool {
        self.send(EngineSignal::Fault(reason.into()))
    }

    fn send(&self, mut signal: EngineSignal) -> bool {
        loop {
            if !self.is_open() {
                return false;
            }
            match self.sender.try_send(signal) {
                Ok(()) => return true,
                Err(TrySendError::Disconnected(_)) => return false,
                Err(TrySendError::Full(back)) => {
                    signal = back;
                    // The session drains under the same lock.
                    let mut overflow = self.overflow.lock();
                    if let Ok(oldest) = self.evict.try_recv() {
                        overflow.absorb(oldest);
                    }
                }
            }
        }
    }
}

/// Exclusive camera device.
pub trait CameraDevice: Send {
    /// Acquires the device.
    ///
    /// # Errors
    ///
    /// A reason string when the device is busy or access is refused.
    fn acquire(&mut self) -> Result<(), String>;

    /// Releases the device. Called exactly once per successful `acquire`.
    fn release(&mut self);
}

/// External tracking engine.
pub trait TrackingEngine: Send {
    /// Starts detection for `config`, producing frames into `sink`.
    ///
    /// # Errors
    ///
    /// A reason string when the configuration is rejected (bad descriptor,
    /// unsupported device).
    fn initialize(&mut self, config: &SessionConfig, sink: FrameSink) -> Result<(), String>;

    /// Stops detection and drops the sink. Called exactly once per
    /// successful `initialize`.
    fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use mirage_shared::{AnchorKey, Pose, PoseEvent, Vec3};

    type Parts = (FrameSink, Receiver<EngineSignal>, Arc<Mutex<Overflow>>, Arc<AtomicBool>);

    fn sink(capacity: usize) -> Parts {
        let (tx, rx) = bounded(capacity);
        let overflow = Arc::new(Mutex::new(Overflow::default()));
        let open = Arc::new(AtomicBool::new(true));
        let sink = FrameSink::new(tx, rx.clone(), Arc::clone(&overflow), Arc::clone(&open));
        (sink, rx, overflow, open)
    }

    fn hit(x: f32) -> PoseEvent {
        PoseEvent::new(AnchorKey::PrimarySurface, Pose::from_position(Vec3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn test_full_queue_moves_oldest_to_overflow() {
        let (sink, rx, overflow, _) = sink(2);

        for frame in 0..5 {
            assert!(sink.push_frame(PoseBatch::empty(frame)));
        }

        let frames: Vec<u64> = rx
            .try_iter()
            .map(|s| match s {
                EngineSignal::Frame(batch) => batch.frame,
                EngineSignal::Fault(_) => unreachable!(),
            })
            .collect();
        assert_eq!(frames, vec![3, 4]);

        let (batch, fault, evicted) = overflow.lock().take();
        assert_eq!(batch.unwrap().frame, 0);
        assert!(fault.is_none());
        assert_eq!(evicted, 3);
        assert_eq!(*overflow.lock(), Overflow::default());
    }

    #[test]
    fn test_overflow_keeps_first_event_per_key() {
        let (sink, _rx, overflow, _) = sink(1);

        sink.push_frame(PoseBatch::empty(0));
        sink.push_frame(PoseBatch::new(1, vec![hit(1.0)]));
        let marker = PoseEvent::new(AnchorKey::Marker(0), Pose::IDENTITY);
        sink.push_frame(PoseBatch::new(2, vec![hit(2.0), marker]));
        sink.push_frame(PoseBatch::empty(3));

        let (batch, _, evicted) = overflow.lock().take();
        let batch = batch.unwrap();
        assert_eq!(evicted, 3);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0], hit(1.0));
        assert_eq!(batch.events[1].key, AnchorKey::Marker(0));
    }

    #[test]
    fn test_evicted_fault_is_kept() {
        let (sink, _rx, overflow, _) = sink(1);

        sink.report_fault("sensor lost");
        sink.push_frame(PoseBatch::empty(0));

        let (_, fault, _) = overflow.lock().take();
        assert_eq!(fault.as_deref(), Some("sensor lost"));
    }

    #[test]
    fn test_closed_sink_refuses_frames() {
        let (sink, rx, _, open) = sink(2);

        open.store(false, Ordering::Release);
        assert!(!sink.is_open());
        assert!(!sink.push_frame(PoseBatch::empty(0)));
        assert!(!sink.report_fault("late"));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_tracking_mode_parses_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: TrackingMode,
        }
        let w: Wrapper = toml::from_str("mode = \"surface_hit_test\"").unwrap();
        assert_eq!(w.mode, TrackingMode::SurfaceHitTest);
        let w: Wrapper = toml::from_str("mode = \"marker\"").unwrap();
        assert_eq!(w.mode, TrackingMode::Marker);
    }
}
