//! Display driver - calls `tick()` at the display cadence.
//!
//! The scheduler has no clock of its own. The driver paces ticks to the
//! configured refresh rate, accumulates timing statistics and stops as soon
//! as the scheduler reports that its session ended.

use std::thread;
use std::time::{Duration, Instant};

use mirage_core::{
    CameraDevice, FrameRenderer, FrameResult, RenderLoopConfig, RenderLoopScheduler, TickOutcome,
    TrackingEngine,
};

/// Why [`DisplayDriver::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverExit {
    /// The session stopped (explicitly or after an engine fault).
    SessionEnded,
    /// The tick limit was reached while the session was still running.
    TickLimit,
}

/// Accumulator for frame statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameStatsAccumulator {
    /// Total frames recorded.
    pub frames_recorded: u64,
    /// Sum of total tick times.
    pub total_us_sum: u64,
    /// Sum of placement times.
    pub placement_us_sum: u64,
    /// Sum of transform times.
    pub transform_us_sum: u64,
    /// Sum of render times.
    pub render_us_sum: u64,
    /// Min tick time.
    pub min_frame_us: u64,
    /// Max tick time.
    pub max_frame_us: u64,
    /// Ticks that exceeded the scheduler's budget.
    pub frames_over_budget: u64,
    /// Ticks that applied at least one pose batch.
    pub batches_applied: u64,
    /// Pose events processed.
    pub events_processed: u64,
    /// Malformed events discarded.
    pub frame_faults: u64,
}

impl FrameStatsAccumulator {
    /// Creates a new accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            placement_us_sum: 0,
            transform_us_sum: 0,
            render_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            batches_applied: 0,
            events_processed: 0,
            frame_faults: 0,
        }
    }

    /// Records one tick.
    pub fn record(&mut self, result: &FrameResult) {
        let total = u64::from(result.frame_time_us);
        self.frames_recorded += 1;
        self.total_us_sum += total;
        self.placement_us_sum += u64::from(result.placement_us);
        self.transform_us_sum += u64::from(result.transform_us);
        self.render_us_sum += u64::from(result.render_us);
        self.min_frame_us = self.min_frame_us.min(total);
        self.max_frame_us = self.max_frame_us.max(total);
        if result.over_budget {
            self.frames_over_budget += 1;
        }
        if result.batch_applied {
            self.batches_applied += 1;
        }
        self.events_processed += u64::from(result.events_processed);
        self.frame_faults += result.placement.faults.len() as u64;
    }

    /// Returns average tick time in milliseconds.
    #[must_use]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Returns the fraction of ticks over budget.
    #[must_use]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }

    /// Prints a summary of the statistics.
    pub fn print_summary(&self) {
        let min_ms =
            if self.frames_recorded == 0 { 0.0 } else { self.min_frame_us as f64 / 1000.0 };
        println!("┌─ TICKS ─────────────────────────────────────────────────────────┐");
        println!("│ Frames Recorded:    {}", self.frames_recorded);
        println!("│ Batches Applied:    {}", self.batches_applied);
        println!("│ Events Processed:   {}", self.events_processed);
        println!("│ Frame Faults:       {}", self.frame_faults);
        println!("└──────────────────────────────────────────────────────────────────┘");
        println!("┌─ TIMING ────────────────────────────────────────────────────────┐");
        println!("│ Average Tick:       {:.3} ms", self.avg_frame_ms());
        println!("│ Min Tick:           {min_ms:.3} ms");
        println!("│ Max Tick:           {:.3} ms", self.max_frame_us as f64 / 1000.0);
        println!(
            "│ Over Budget:        {} ({:.1}%)",
            self.frames_over_budget,
            self.over_budget_ratio() * 100.0
        );
        if self.frames_recorded > 0 {
            let n = self.frames_recorded as f64;
            println!("│ Placement:          {:.3} ms", self.placement_us_sum as f64 / n / 1000.0);
            println!("│ Transforms:         {:.3} ms", self.transform_us_sum as f64 / n / 1000.0);
            println!("│ Render:             {:.3} ms", self.render_us_sum as f64 / n / 1000.0);
        }
        println!("└──────────────────────────────────────────────────────────────────┘");
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Paces a [`RenderLoopScheduler`] at the display refresh rate.
#[derive(Clone, Debug)]
pub struct DisplayDriver {
    frame_time: Option<Duration>,
    stats: FrameStatsAccumulator,
}

impl DisplayDriver {
    /// Driver targeting `target_fps`. 0 runs unthrottled.
    #[must_use]
    pub fn new(target_fps: u32) -> Self {
        let frame_time =
            (target_fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(target_fps)));
        Self { frame_time, stats: FrameStatsAccumulator::new() }
    }

    /// Driver using the scheduler configuration's refresh rate.
    #[must_use]
    pub fn from_config(config: &RenderLoopConfig) -> Self {
        Self::new(config.target_fps)
    }

    /// Target time per tick, `None` when unthrottled.
    #[must_use]
    pub fn frame_time(&self) -> Option<Duration> {
        self.frame_time
    }

    /// Ticks `scheduler` until its session ends or `max_ticks` ticks have
    /// rendered.
    pub fn run<C, E, R>(
        &mut self,
        scheduler: &mut RenderLoopScheduler<C, E, R>,
        max_ticks: Option<u64>,
    ) -> DriverExit
    where
        C: CameraDevice,
        E: TrackingEngine,
        R: FrameRenderer,
    {
        self.run_with(scheduler, max_ticks, |_| {})
    }

    /// Like [`DisplayDriver::run`], calling `on_frame` after every rendered
    /// tick.
    pub fn run_with<C, E, R, F>(
        &mut self,
        scheduler: &mut RenderLoopScheduler<C, E, R>,
        max_ticks: Option<u64>,
        mut on_frame: F,
    ) -> DriverExit
    where
        C: CameraDevice,
        E: TrackingEngine,
        R: FrameRenderer,
        F: FnMut(&FrameResult),
    {
        let mut ticks = 0u64;
        let mut next_deadline = Instant::now();

        loop {
            if max_ticks.is_some_and(|max| ticks >= max) {
                return DriverExit::TickLimit;
            }

            match scheduler.tick() {
                TickOutcome::Rendered(result) => {
                    self.stats.record(&result);
                    on_frame(&result);
                }
                TickOutcome::SessionEnded => {
                    tracing::info!("Display driver stopping after {ticks} ticks: session ended");
                    return DriverExit::SessionEnded;
                }
            }
            ticks += 1;

            if let Some(frame_time) = self.frame_time {
                next_deadline += frame_time;
                let now = Instant::now();
                if next_deadline > now {
                    thread::sleep(next_deadline - now);
                } else {
                    // Fell behind; resync instead of bursting to catch up.
                    next_deadline = now;
                }
            }
        }
    }

    /// Accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// Clears accumulated statistics.
    pub fn reset_stats(&mut self) {
        self.stats = FrameStatsAccumulator::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_core::sim::{RecordingRenderer, ResourceTracker, ScriptedCamera, ScriptedEngine};
    use mirage_core::{SessionConfig, TrackingSession};
    use mirage_shared::{AnchorKey, Pose, PoseEvent, Vec3};

    type Scheduler = RenderLoopScheduler<ScriptedCamera, ScriptedEngine, RecordingRenderer>;

    fn scheduler(tracker: &ResourceTracker) -> Scheduler {
        let camera = ScriptedCamera::new(tracker);
        let session = TrackingSession::new(camera, ScriptedEngine::new(tracker));
        let config = RenderLoopConfig { frame_budget_us: u32::MAX, ..RenderLoopConfig::default() };
        RenderLoopScheduler::new(session, RecordingRenderer::new(), config)
    }

    #[test]
    fn test_frame_time_from_fps() {
        assert_eq!(DisplayDriver::new(0).frame_time(), None);
        let driver = DisplayDriver::new(50);
        assert_eq!(driver.frame_time(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_run_stops_at_tick_limit() {
        let tracker = ResourceTracker::new();
        let mut s = scheduler(&tracker);
        s.start(SessionConfig::surface_hit_test()).unwrap();

        let mut driver = DisplayDriver::new(0);
        assert_eq!(driver.run(&mut s, Some(25)), DriverExit::TickLimit);
        assert_eq!(driver.stats().frames_recorded, 25);
        assert_eq!(s.renderer().frames().len(), 25);
        assert!(s.is_active());
    }

    #[test]
    fn test_run_ends_with_session() {
        let tracker = ResourceTracker::new();
        let mut s = scheduler(&tracker);
        let handle = s.session().engine().handle();
        s.start(SessionConfig::surface_hit_test()).unwrap();

        let mut driver = DisplayDriver::new(0);
        let exit = driver.run_with(&mut s, Some(1_000), |result| {
            if result.frame_number == 3 {
                handle.fault("camera unplugged");
            }
        });

        assert_eq!(exit, DriverExit::SessionEnded);
        assert_eq!(driver.stats().frames_recorded, 3);
        assert!(!tracker.camera_held());
    }

    #[test]
    fn test_stats_track_batches() {
        let tracker = ResourceTracker::new();
        let mut s = scheduler(&tracker);
        let handle = s.session().engine().handle();
        s.start(SessionConfig::surface_hit_test()).unwrap();

        let mut driver = DisplayDriver::new(0);
        let emitter = handle.clone();
        driver.run_with(&mut s, Some(4), move |result| {
            if result.frame_number % 2 == 1 {
                let hit = PoseEvent::new(AnchorKey::PrimarySurface, Pose::from_position(Vec3::Z));
                emitter.emit(vec![hit]);
            }
        });

        let stats = driver.stats();
        assert_eq!(stats.frames_recorded, 4);
        assert_eq!(stats.batches_applied, 2);
        assert_eq!(stats.events_processed, 2);
        assert_eq!(s.registry().len(), 1);
        assert_eq!(s.placement().unwrap().stats().discarded_placements, 1);

        driver.reset_stats();
        assert_eq!(driver.stats().frames_recorded, 0);
    }

    #[test]
    fn test_throttled_run_paces_ticks() {
        let tracker = ResourceTracker::new();
        let mut s = scheduler(&tracker);
        s.start(SessionConfig::surface_hit_test()).unwrap();

        let mut driver = DisplayDriver::new(200);
        let start = Instant::now();
        driver.run(&mut s, Some(5));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
