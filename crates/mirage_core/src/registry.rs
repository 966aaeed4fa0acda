//! # Anchor Registry
//!
//! One entry per logical anchor, keyed by [`AnchorKey`].
//!
//! - Marker anchors toggle between `Tracked` and `Lost` frame by frame.
//! - The primary-surface anchor is frozen: it is never marked `Lost`.
//! - Nothing is removed while a session runs; [`AnchorRegistry::clear`] is
//!   called when the owning session stops.

use std::collections::BTreeMap;
use std::time::Instant;

use mirage_shared::{AnchorKey, Pose};

/// Per-frame tracking status of an anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingState {
    /// Reported in the most recent frame.
    Tracked,
    /// Previously tracked, absent from the most recent frame.
    Lost,
}

/// When an anchor was created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorTimestamp {
    /// Scheduler tick.
    pub tick: u64,
    /// Wall-clock instant.
    pub at: Instant,
}

impl AnchorTimestamp {
    /// Timestamp for `tick`, taken now.
    #[must_use]
    pub fn now(tick: u64) -> Self {
        Self { tick, at: Instant::now() }
    }
}

/// A content-bearing reference frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    /// Stable key.
    pub key: AnchorKey,
    /// Most recent transform (frozen for the primary surface).
    pub transform: Pose,
    /// Tracking status.
    pub state: TrackingState,
    /// Creation time.
    pub created_at: AnchorTimestamp,
}

impl Anchor {
    /// True if the pose is frozen after creation.
    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.key == AnchorKey::PrimarySurface
    }

    /// True if content bound to this anchor should be drawn.
    #[inline]
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.is_frozen() || self.state == TrackingState::Tracked
    }
}

/// Map from anchor key to anchor.
#[derive(Clone, Debug, Default)]
pub struct AnchorRegistry {
    anchors: BTreeMap<AnchorKey, Anchor>,
}

impl AnchorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the anchor for `key`.
    #[must_use]
    pub fn resolve(&self, key: AnchorKey) -> Option<&Anchor> {
        self.anchors.get(&key)
    }

    /// Creates the anchor if absent, otherwise replaces its transform and
    /// marks it `Tracked`.
    ///
    /// `created_at` is only used on creation.
    pub fn upsert(&mut self, key: AnchorKey, pose: Pose, created_at: AnchorTimestamp) -> &Anchor {
        let anchor = self
            .anchors
            .entry(key)
            .and_modify(|a| {
                a.transform = pose;
                a.state = TrackingState::Tracked;
            })
            .or_insert(Anchor { key, transform: pose, state: TrackingState::Tracked, created_at });
        &*anchor
    }

    /// Marks a tracked marker anchor as `Lost`, keeping its transform.
    ///
    /// No-op for absent keys, already-lost anchors and the frozen surface
    /// anchor. Returns true if the state changed.
    pub fn mark_lost(&mut self, key: AnchorKey) -> bool {
        match self.anchors.get_mut(&key) {
            Some(anchor) if !anchor.is_frozen() && anchor.state == TrackingState::Tracked => {
                anchor.state = TrackingState::Lost;
                true
            }
            _ => false,
        }
    }

    /// Keys of marker anchors currently `Tracked`, in key order.
    #[must_use]
    pub fn tracked_marker_keys(&self) -> Vec<AnchorKey> {
        self.anchors
            .values()
            .filter(|a| a.key.is_marker() && a.state == TrackingState::Tracked)
            .map(|a| a.key)
            .collect()
    }

    /// Removes every anchor. Only the owning session's stop calls this.
    pub fn clear(&mut self) {
        self.anchors.clear();
    }

    /// Number of anchors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// True if no anchor exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Anchors in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_shared::Vec3;

    fn at(x: f32) -> Pose {
        Pose::from_position(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let mut reg = AnchorRegistry::new();
        let created = AnchorTimestamp::now(1);

        let a = *reg.upsert(AnchorKey::Marker(0), at(1.0), created);
        assert_eq!(a.state, TrackingState::Tracked);
        assert_eq!(a.created_at, created);

        let b = *reg.upsert(AnchorKey::Marker(0), at(2.0), AnchorTimestamp::now(2));
        assert_eq!(b.transform, at(2.0));
        assert_eq!(b.created_at, created);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_mark_lost_keeps_transform() {
        let mut reg = AnchorRegistry::new();
        reg.upsert(AnchorKey::Marker(3), at(1.0), AnchorTimestamp::now(0));

        assert!(reg.mark_lost(AnchorKey::Marker(3)));
        let a = reg.resolve(AnchorKey::Marker(3)).unwrap();
        assert_eq!(a.state, TrackingState::Lost);
        assert_eq!(a.transform, at(1.0));
        assert!(!a.is_renderable());

        // Second call is a no-op.
        assert!(!reg.mark_lost(AnchorKey::Marker(3)));

        // Re-detection brings it back.
        reg.upsert(AnchorKey::Marker(3), at(4.0), AnchorTimestamp::now(5));
        assert_eq!(reg.resolve(AnchorKey::Marker(3)).unwrap().state, TrackingState::Tracked);
    }

    #[test]
    fn test_surface_anchor_never_lost() {
        let mut reg = AnchorRegistry::new();
        reg.upsert(AnchorKey::PrimarySurface, at(1.0), AnchorTimestamp::now(0));

        assert!(!reg.mark_lost(AnchorKey::PrimarySurface));
        let a = reg.resolve(AnchorKey::PrimarySurface).unwrap();
        assert_eq!(a.state, TrackingState::Tracked);
        assert!(a.is_frozen());
        assert!(a.is_renderable());
    }

    #[test]
    fn test_mark_lost_on_absent_key() {
        let mut reg = AnchorRegistry::new();
        assert!(!reg.mark_lost(AnchorKey::Marker(9)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_tracked_marker_keys_and_clear() {
        let mut reg = AnchorRegistry::new();
        let ts = AnchorTimestamp::now(0);
        reg.upsert(AnchorKey::Marker(2), at(0.0), ts);
        reg.upsert(AnchorKey::Marker(0), at(0.0), ts);
        reg.upsert(AnchorKey::PrimarySurface, at(0.0), ts);
        reg.mark_lost(AnchorKey::Marker(2));

        assert_eq!(reg.tracked_marker_keys(), vec![AnchorKey::Marker(0)]);

        reg.clear();
        assert!(reg.is_empty());
        assert!(reg.resolve(AnchorKey::Marker(0)).is_none());
    }
}
