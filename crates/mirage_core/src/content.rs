//! Attached content.
//!
//! Content references anchors by key; it never owns them. Many items can
//! share one anchor. Each tick the scheduler composes
//! `anchor ∘ local offset ∘ animation` for every item whose anchor is
//! renderable and hides the rest.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use mirage_shared::{AnchorKey, Pose, Quaternion, Vec3};

use crate::registry::AnchorRegistry;
use crate::render::DrawItem;

/// Handle to attached content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(pub u32);

/// Content-local per-tick animation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Animation {
    /// Rotate about `axis` by a fixed angle every visible tick.
    Spin {
        /// Rotation axis in the content's local frame.
        axis: Vec3,
        /// Angle added per tick.
        radians_per_tick: f32,
    },
}

/// What to attach.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContentSpec {
    /// Offset from the anchor.
    pub local: Pose,
    /// Optional animation.
    pub animation: Option<Animation>,
}

impl ContentSpec {
    /// Content sitting exactly on its anchor.
    #[must_use]
    pub fn at_anchor() -> Self {
        Self::default()
    }

    /// Sets the local offset.
    #[must_use]
    pub fn offset(mut self, local: Pose) -> Self {
        self.local = local;
        self
    }

    /// Spins about `axis` by `radians_per_tick`.
    #[must_use]
    pub fn spinning(mut self, axis: Vec3, radians_per_tick: f32) -> Self {
        self.animation = Some(Animation::Spin { axis, radians_per_tick });
        self
    }
}

/// Content bound to an anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttachedContent {
    /// Handle.
    pub id: ContentId,
    /// Anchor it follows.
    pub anchor: AnchorKey,
    /// Offset from the anchor.
    pub local: Pose,
    /// Animation, if any.
    pub animation: Option<Animation>,
    /// Accumulated animation angle in `[0, TAU)`.
    pub angle: f32,
    /// Transform applied on the last visible tick.
    pub world: Option<Pose>,
    /// Whether the last tick drew it.
    pub visible: bool,
}

impl AttachedContent {
    fn animated_local(&self) -> Pose {
        match self.animation {
            Some(Animation::Spin { axis, .. }) => Pose::new(
                self.local.position,
                self.local.orientation * Quaternion::from_axis_angle(axis, self.angle),
            ),
            None => self.local,
        }
    }

    fn advance(&mut self) {
        if let Some(Animation::Spin { radians_per_tick, .. }) = self.animation {
            self.angle = (self.angle + radians_per_tick).rem_euclid(TAU);
        }
    }
}

/// Result of applying transforms for one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentPass {
    /// Visible items in content order.
    pub items: Vec<DrawItem>,
    /// Items hidden because their anchor is lost or not yet placed.
    pub hidden: u32,
}

/// Explicit mapping from anchor key to attached content.
#[derive(Clone, Debug, Default)]
pub struct ContentStore {
    items: BTreeMap<ContentId, AttachedContent>,
    by_anchor: BTreeMap<AnchorKey, Vec<ContentId>>,
    next_id: u32,
}

impl ContentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds new content to `anchor`. The anchor need not exist yet.
    pub fn attach(&mut self, anchor: AnchorKey, spec: ContentSpec) -> ContentId {
        let id = ContentId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.items.insert(
            id,
            AttachedContent {
                id,
                anchor,
                local: spec.local,
                animation: spec.animation,
                angle: 0.0,
                world: None,
                visible: false,
            },
        );
        self.by_anchor.entry(anchor).or_default().push(id);
        id
    }

    /// Looks up content.
    #[must_use]
    pub fn get(&self, id: ContentId) -> Option<&AttachedContent> {
        self.items.get(&id)
    }

    /// Content bound to `anchor`, in attach order.
    #[must_use]
    pub fn bound_to(&self, anchor: AnchorKey) -> &[ContentId] {
        self.by_anchor.get(&anchor).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of attached items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Releases all content. Called when the owning session stops.
    pub fn clear(&mut self) {
        self.items.clear();
        self.by_anchor.clear();
    }

    /// Applies anchor transforms and advances animations.
    ///
    /// Content on a renderable anchor is positioned and animated; everything
    /// else is hidden with its animation paused.
    pub fn apply(&mut self, registry: &AnchorRegistry) -> ContentPass {
        let mut pass = ContentPass { items: Vec::with_capacity(self.items.len()), hidden: 0 };

        for (key, ids) in &self.by_anchor {
            let anchor_pose = registry
                .resolve(*key)
                .filter(|a| a.is_renderable())
                .map(|a| a.transform);

            for id in ids {
                let Some(content) = self.items.get_mut(id) else { continue };
                match anchor_pose {
                    Some(anchor) => {
                        content.advance();
                        let world = anchor.compose(content.animated_local());
                        content.world = Some(world);
                        content.visible = true;
                        pass.items.push(DrawItem { content: *id, anchor: *key, transform: world });
                    }
                    None => {
                        content.visible = false;
                        pass.hidden += 1;
                    }
                }
            }
        }

        pass
    }
}
