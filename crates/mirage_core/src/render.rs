//! Rendering surface boundary.
//!
//! The scheduler hands the renderer a flat list of transforms once per tick
//! and waits for the acknowledgment. Viewport and resize handling belong to
//! the renderer.

use mirage_shared::{AnchorKey, Pose};

use crate::content::ContentId;

/// One visible content item for this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    /// Content handle.
    pub content: ContentId,
    /// Anchor the content is bound to.
    pub anchor: AnchorKey,
    /// Session-space transform to draw with.
    pub transform: Pose,
}

/// Everything the renderer needs for one frame.
#[derive(Clone, Copy, Debug)]
pub struct RenderFrame<'a> {
    /// Scheduler tick number.
    pub frame_number: u64,
    /// Visible items; hidden content is absent.
    pub items: &'a [DrawItem],
}

/// Completed-frame acknowledgment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameAck {
    /// Tick number that was presented.
    pub frame_number: u64,
    /// Items actually drawn.
    pub items_drawn: u32,
}

/// External renderer.
pub trait FrameRenderer {
    /// Draws and presents one frame.
    fn render(&mut self, frame: &RenderFrame<'_>) -> FrameAck;
}
