//! Benchmark for the render loop tick.
//!
//! Run with: cargo bench --package mirage_core --bench tick_benchmark

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mirage_core::sim::{RecordingRenderer, ResourceTracker, ScriptedCamera, ScriptedEngine};
use mirage_core::{
    AnchorRegistry, ContentSpec, PlacementController, PoseValidation, RenderLoopConfig,
    RenderLoopScheduler, SessionConfig, TargetCatalog, TargetEntry, TrackingMode, TrackingSession,
};
use mirage_core::registry::AnchorTimestamp;
use mirage_shared::{AnchorKey, Pose, PoseBatch, PoseEvent, Quaternion, Vec3};

fn catalog(len: u16) -> TargetCatalog {
    let entries = (0..len)
        .map(|i| TargetEntry {
            name: format!("target_{i}"),
            image: format!("target_{i}.png").into(),
            physical_width_m: 0.2,
        })
        .collect();
    TargetCatalog::from_entries(entries).unwrap()
}

fn marker_batch(frame: u64, markers: u16) -> PoseBatch {
    let events = (0..markers)
        .map(|i| {
            let angle = f32::from(i) * 0.1 + frame as f32 * 0.01;
            PoseEvent::new(
                AnchorKey::Marker(i),
                Pose::new(
                    Vec3::new(f32::from(i) * 0.3, 0.0, -1.0),
                    Quaternion::from_axis_angle(Vec3::Y, angle),
                ),
            )
        })
        .collect();
    PoseBatch::new(frame, events)
}

fn benchmark_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement_process");
    for markers in [1u16, 16, 64] {
        let catalog_len = Some(usize::from(markers));
        let mut controller =
            PlacementController::new(TrackingMode::Marker, catalog_len, PoseValidation::default());
        let mut registry = AnchorRegistry::new();
        let batch = marker_batch(0, markers);

        group.bench_with_input(BenchmarkId::from_parameter(markers), &batch, |b, batch| {
            b.iter(|| black_box(controller.process(batch, &mut registry, AnchorTimestamp::now(0))));
        });
    }
    group.finish();
}

fn benchmark_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_tick");
    for markers in [1u16, 16, 64] {
        let tracker = ResourceTracker::new();
        let engine = ScriptedEngine::new(&tracker);
        let handle = engine.handle();
        let session = TrackingSession::new(ScriptedCamera::new(&tracker), engine);
        let config = RenderLoopConfig { frame_budget_us: u32::MAX, ..RenderLoopConfig::default() };
        let renderer = RecordingRenderer::keeping_last(1);
        let mut scheduler = RenderLoopScheduler::new(session, renderer, config);
        scheduler.start(SessionConfig::marker(catalog(markers))).unwrap();
        for i in 0..markers {
            let spec = ContentSpec::at_anchor().spinning(Vec3::Y, 0.01);
            scheduler.attach(AnchorKey::Marker(i), spec);
        }

        group.bench_function(BenchmarkId::from_parameter(markers), |b| {
            let mut frame = 0u64;
            b.iter(|| {
                frame += 1;
                handle.emit_batch(marker_batch(frame, markers));
                black_box(scheduler.tick())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_placement, benchmark_tick);
criterion_main!(benches);
