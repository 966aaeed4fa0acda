//! Per-frame pose events emitted by a tracking engine.

use std::fmt;

use crate::math::Pose;

/// Stable identifier of a logical anchor.
///
/// Ordered so that registries iterate deterministically: markers by index,
/// then the primary surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnchorKey {
    /// Marker index in the active target catalog.
    Marker(u16),
    /// The first detected placement surface (hit-test mode).
    PrimarySurface,
}

impl AnchorKey {
    /// Returns true for marker keys.
    #[inline]
    #[must_use]
    pub const fn is_marker(self) -> bool {
        matches!(self, Self::Marker(_))
    }
}

impl fmt::Display for AnchorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marker(index) => write!(f, "marker#{index}"),
            Self::PrimarySurface => f.write_str("primary-surface"),
        }
    }
}

/// One pose reported for one anchor in one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseEvent {
    /// Anchor the pose belongs to.
    pub key: AnchorKey,
    /// Reported transform.
    pub pose: Pose,
}

impl PoseEvent {
    /// Creates a new pose event.
    #[must_use]
    pub const fn new(key: AnchorKey, pose: Pose) -> Self {
        Self { key, pose }
    }
}

/// Every pose event the engine produced for a single camera frame.
///
/// An empty batch is the normal "nothing detected" case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseBatch {
    /// Engine frame counter.
    pub frame: u64,
    /// Events in engine order.
    pub events: Vec<PoseEvent>,
}

impl PoseBatch {
    /// Creates a batch for `frame`.
    #[must_use]
    pub fn new(frame: u64, events: Vec<PoseEvent>) -> Self {
        Self { frame, events }
    }

    /// An empty batch for `frame`.
    #[must_use]
    pub fn empty(frame: u64) -> Self {
        Self { frame, events: Vec::new() }
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if the frame produced no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn test_anchor_key_ordering() {
        let mut keys = vec![AnchorKey::PrimarySurface, AnchorKey::Marker(2), AnchorKey::Marker(0)];
        keys.sort();
        let expected = vec![AnchorKey::Marker(0), AnchorKey::Marker(2), AnchorKey::PrimarySurface];
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_anchor_key_display() {
        assert_eq!(AnchorKey::Marker(7).to_string(), "marker#7");
        assert_eq!(AnchorKey::PrimarySurface.to_string(), "primary-surface");
        assert!(AnchorKey::Marker(7).is_marker());
        assert!(!AnchorKey::PrimarySurface.is_marker());
    }

    #[test]
    fn test_batch_len() {
        let batch = PoseBatch::new(
            3,
            vec![PoseEvent::new(AnchorKey::Marker(1), Pose::from_position(Vec3::X))],
        );
        assert_eq!(batch.frame, 3);
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
        assert!(PoseBatch::empty(4).is_empty());
    }
}
