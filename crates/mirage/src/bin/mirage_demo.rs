//! # MIRAGE Demo
//!
//! Headless run of both tracking modes against the scripted engine:
//!
//! 1. **Surface hit-test**: a jittery stream of hits; the cube stays where
//!    the first one landed and spins.
//! 2. **Marker**: three targets, one of which drops out of view for a while;
//!    its label hides and reappears.
//!
//! Run with: cargo run --bin mirage_demo -- [config.toml]
//! Log level via `RUST_LOG` (default `info`).

use std::error::Error;
use std::thread;
use std::time::Duration;

use mirage::{DisplayDriver, DriverExit};
use mirage_core::sim::{
    RecordingRenderer, ResourceTracker, ScriptedCamera, ScriptedEngine, ScriptedEngineHandle,
};
use mirage_core::{
    ContentSpec, MirageConfig, RenderLoopScheduler, SessionConfig, TargetCatalog, TargetEntry,
    TrackingMode, TrackingSession,
};
use mirage_shared::{AnchorKey, Pose, PoseEvent, Quaternion, Vec3};
use tracing_subscriber::EnvFilter;

type DemoScheduler = RenderLoopScheduler<ScriptedCamera, ScriptedEngine, RecordingRenderer>;

/// Engine frame interval (30 Hz, slower than the display).
const ENGINE_FRAME: Duration = Duration::from_millis(33);

/// Ticks per demo run.
const DEMO_TICKS: u64 = 180;

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::args().nth(1) {
        Some(path) => MirageConfig::load(path)?,
        None => MirageConfig::default(),
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                          MIRAGE DEMO                             ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    run_surface_demo(&config)?;

    let marker_config = match config.session.mode {
        TrackingMode::Marker => config.session_config()?,
        TrackingMode::SurfaceHitTest => SessionConfig::marker(demo_catalog()?),
    };
    run_marker_demo(&config, marker_config)?;

    Ok(())
}

fn build_scheduler(
    config: &MirageConfig,
    tracker: &ResourceTracker,
) -> (DemoScheduler, ScriptedEngineHandle) {
    let engine = ScriptedEngine::new(tracker);
    let handle = engine.handle();
    let session = TrackingSession::new(ScriptedCamera::new(tracker), engine)
        .with_queue_capacity(config.engine.frame_queue_capacity);
    let renderer = RecordingRenderer::keeping_last(1);
    let scheduler = RenderLoopScheduler::new(session, renderer, config.render.clone())
        .with_validation(config.validation);
    (scheduler, handle)
}

fn run_surface_demo(config: &MirageConfig) -> Result<(), Box<dyn Error>> {
    println!("\n── Surface hit-test ──────────────────────────────────────────────");
    let tracker = ResourceTracker::new();
    let (mut scheduler, handle) = build_scheduler(config, &tracker);

    scheduler.start(SessionConfig::surface_hit_test())?;
    let cube = scheduler.attach_spinning(AnchorKey::PrimarySurface);

    let producer = thread::spawn(move || {
        let mut i = 0u32;
        // Stops once the session closes its sink.
        loop {
            let t = i as f32 * 0.05;
            let jitter = Vec3::new(t.sin() * 0.2, 0.0, -t.cos() * 0.1);
            let hit = Pose::from_position(Vec3::new(0.1, 0.2, -0.5) + jitter);
            if !handle.emit(vec![PoseEvent::new(AnchorKey::PrimarySurface, hit)]) {
                break;
            }
            i += 1;
            thread::sleep(ENGINE_FRAME);
        }
    });

    let mut driver = DisplayDriver::from_config(scheduler.config());
    let exit = driver.run(&mut scheduler, Some(DEMO_TICKS));

    if let Some(anchor) = scheduler.registry().resolve(AnchorKey::PrimarySurface) {
        let p = anchor.transform.position;
        println!("Surface anchor:     ({:.3}, {:.3}, {:.3})", p.x, p.y, p.z);
    }
    if let Some(content) = scheduler.content().get(cube) {
        println!("Cube spin angle:    {:.3} rad", content.angle);
    }
    if let Some(placement) = scheduler.placement() {
        println!("Hits discarded:     {}", placement.stats().discarded_placements);
    }

    finish(&mut scheduler, &driver, exit, &tracker);
    producer.join().map_err(|_| "surface producer panicked")?;
    Ok(())
}

fn run_marker_demo(
    config: &MirageConfig,
    session_config: SessionConfig,
) -> Result<(), Box<dyn Error>> {
    println!("\n── Marker tracking ───────────────────────────────────────────────");
    let tracker = ResourceTracker::new();
    let (mut scheduler, handle) = build_scheduler(config, &tracker);

    let targets = session_config.catalog.as_ref().map_or(0, TargetCatalog::len);
    let visible = u16::try_from(targets.min(3)).unwrap_or(3);
    scheduler.start(session_config)?;
    for index in 0..visible {
        scheduler.attach(
            AnchorKey::Marker(index),
            ContentSpec::at_anchor()
                .offset(Pose::from_position(Vec3::new(0.0, 0.05, 0.0)))
                .spinning(Vec3::Y, config.render.spin_radians_per_tick),
        );
    }

    let producer = thread::spawn(move || {
        let mut frame = 0u32;
        loop {
            let t = frame as f32 * 0.033;
            let events = (0..visible)
                // Marker 1 leaves the view between frames 40 and 80.
                .filter(|&i| !(i == 1 && (40..80).contains(&frame)))
                .map(|i| {
                    let x = f32::from(i);
                    let pose = Pose::new(
                        Vec3::new(x * 0.3 - 0.3, (t + x).sin() * 0.02, -1.0),
                        Quaternion::from_axis_angle(Vec3::Z, t * 0.1),
                    );
                    PoseEvent::new(AnchorKey::Marker(i), pose)
                })
                .collect();
            if !handle.emit(events) {
                break;
            }
            frame += 1;
            thread::sleep(ENGINE_FRAME);
        }
    });

    let mut driver = DisplayDriver::from_config(scheduler.config());
    let mut hidden_ticks = 0u64;
    let exit = driver.run_with(&mut scheduler, Some(DEMO_TICKS), |result| {
        if result.items_hidden > 0 {
            hidden_ticks += 1;
        }
    });

    for anchor in scheduler.registry().iter() {
        println!("Anchor {:<16} {:?}", anchor.key.to_string(), anchor.state);
    }
    println!("Ticks with hidden content: {hidden_ticks}");

    finish(&mut scheduler, &driver, exit, &tracker);
    producer.join().map_err(|_| "marker producer panicked")?;
    Ok(())
}

fn finish(
    scheduler: &mut DemoScheduler,
    driver: &DisplayDriver,
    exit: DriverExit,
    tracker: &ResourceTracker,
) {
    if exit == DriverExit::TickLimit {
        scheduler.stop();
    }
    driver.stats().print_summary();

    let session = scheduler.session().stats();
    println!(
        "Engine frames: {} delivered, {} coalesced | camera held after stop: {}",
        session.frames_delivered,
        session.frames_coalesced,
        tracker.camera_held()
    );
}

fn demo_catalog() -> Result<TargetCatalog, Box<dyn Error>> {
    let entries = ["poster", "book", "card"]
        .iter()
        .zip([0.21, 0.15, 0.085])
        .map(|(name, width)| TargetEntry {
            name: (*name).to_string(),
            image: format!("targets/{name}.png").into(),
            physical_width_m: width,
        })
        .collect();
    Ok(TargetCatalog::from_entries(entries)?)
}
