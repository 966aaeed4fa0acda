//! # Placement Controller
//!
//! Resolves one frame's pose events against the [`AnchorRegistry`].
//!
//! ## Policy
//!
//! | Mode             | Event for new key | Event for known key | Key absent from frame |
//! |------------------|-------------------|---------------------|-----------------------|
//! | Marker           | create            | update, `Tracked`   | `Lost`                |
//! | Surface hit-test | create (once)     | discard             | nothing               |
//!
//! The surface discard is the placement idempotency guarantee: the first hit
//! after session start wins, whatever its quality, and every later hit is
//! dropped.
//!
//! Malformed events are frame faults: they are logged, counted and skipped
//! for this frame only.

use std::collections::BTreeSet;

use mirage_shared::{AnchorKey, PoseBatch, PoseEvent};
use serde::Deserialize;

use crate::engine::TrackingMode;
use crate::error::FrameFault;
use crate::registry::{AnchorRegistry, AnchorTimestamp};

/// Tolerances applied to incoming poses.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoseValidation {
    /// Maximum allowed `| |q|^2 - 1 |` for orientations.
    pub norm_tolerance: f32,
}

impl Default for PoseValidation {
    fn default() -> Self {
        Self { norm_tolerance: 1e-3 }
    }
}

/// What one frame did to the registry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlacementReport {
    /// Anchors created.
    pub created: u32,
    /// Existing anchors updated.
    pub updated: u32,
    /// Marker anchors transitioned to `Lost`.
    pub lost: u32,
    /// Surface hits dropped because placement already happened.
    pub discarded: u32,
    /// Malformed events skipped.
    pub faults: Vec<FrameFault>,
}

impl PlacementReport {
    /// Folds the report of a later batch in the same tick into this one.
    pub fn absorb(&mut self, other: PlacementReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.lost += other.lost;
        self.discarded += other.discarded;
        self.faults.extend(other.faults);
    }
}

/// Totals since the controller was configured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlacementStats {
    /// Batches processed.
    pub batches: u64,
    /// Anchors created.
    pub anchors_created: u64,
    /// Surface hits discarded after the first placement.
    pub discarded_placements: u64,
    /// Malformed events skipped.
    pub frame_faults: u64,
}

/// Turns pose batches into registry changes for one session.
#[derive(Clone, Debug)]
pub struct PlacementController {
    mode: TrackingMode,
    catalog_len: Option<usize>,
    validation: PoseValidation,
    stats: PlacementStats,
}

impl PlacementController {
    /// Controller for a session in `mode`.
    ///
    /// `catalog_len` bounds valid marker indices; `None` accepts any index.
    #[must_use]
    pub fn new(mode: TrackingMode, catalog_len: Option<usize>, validation: PoseValidation) -> Self {
        Self { mode, catalog_len, validation, stats: PlacementStats::default() }
    }

    /// Tracking mode this controller enforces.
    #[must_use]
    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// Running totals.
    #[must_use]
    pub fn stats(&self) -> PlacementStats {
        self.stats
    }

    /// Checks a single event against the mode, the catalog and the pose
    /// tolerances.
    ///
    /// # Errors
    ///
    /// The [`FrameFault`] describing why the event is malformed.
    pub fn validate(&self, event: &PoseEvent) -> Result<(), FrameFault> {
        let key = event.key;
        match (self.mode, key) {
            (TrackingMode::Marker, AnchorKey::Marker(index)) => {
                if let Some(len) = self.catalog_len {
                    if usize::from(index) >= len {
                        return Err(FrameFault::UnknownMarker { index, catalog_len: len });
                    }
                }
            }
            (TrackingMode::SurfaceHitTest, AnchorKey::PrimarySurface) => {}
            _ => return Err(FrameFault::ModeMismatch(key)),
        }

        if !event.pose.is_finite() {
            return Err(FrameFault::NonFinite(key));
        }
        let norm_squared = event.pose.orientation.norm_squared();
        if (norm_squared - 1.0).abs() > self.validation.norm_tolerance {
            return Err(FrameFault::Denormalized { key, norm_squared });
        }
        Ok(())
    }

    /// Applies one frame's batch to `registry`.
    ///
    /// `now` stamps anchors created by this batch.
    pub fn process(
        &mut self,
        batch: &PoseBatch,
        registry: &mut AnchorRegistry,
        now: AnchorTimestamp,
    ) -> PlacementReport {
        let mut report = PlacementReport::default();
        let mut seen = BTreeSet::new();

        for event in &batch.events {
            if let Err(fault) = self.validate(event) {
                tracing::warn!("Discarding malformed pose in frame {}: {fault}", batch.frame);
                report.faults.push(fault);
                continue;
            }

            match self.mode {
                TrackingMode::Marker => {
                    let existed = registry.resolve(event.key).is_some();
                    registry.upsert(event.key, event.pose, now);
                    seen.insert(event.key);
                    if existed {
                        report.updated += 1;
                    } else {
                        tracing::info!("Marker anchor {} acquired at tick {}", event.key, now.tick);
                        report.created += 1;
                    }
                }
                TrackingMode::SurfaceHitTest => {
                    if registry.resolve(AnchorKey::PrimarySurface).is_some() {
                        report.discarded += 1;
                        continue;
                    }
                    let p = event.pose.position;
                    registry.upsert(AnchorKey::PrimarySurface, event.pose, now);
                    tracing::info!(
                        "Content placed on surface at ({:.3}, {:.3}, {:.3}), tick {}",
                        p.x,
                        p.y,
                        p.z,
                        now.tick
                    );
                    report.created += 1;
                }
            }
        }

        if self.mode == TrackingMode::Marker {
            for key in registry.tracked_marker_keys() {
                if !seen.contains(&key) && registry.mark_lost(key) {
                    tracing::debug!("Marker anchor {key} lost at tick {}", now.tick);
                    report.lost += 1;
                }
            }
        }

        self.stats.batches += 1;
        self.stats.anchors_created += u64::from(report.created);
        self.stats.discarded_placements += u64::from(report.discarded);
        self.stats.frame_faults += report.faults.len() as u64;
        report
    }
}
