//! The two handles the presentation layer hands to the feedback engine:
//! the editable text surface and the overlay markers are drawn on.

use crate::model::FeedbackKind;

/// Rich content as a tree. Only `Text` leaves carry characters; elements
/// just group children in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    Text(String),
    Element(Vec<ContentNode>),
}

impl ContentNode {
    pub fn text(s: impl Into<String>) -> Self {
        ContentNode::Text(s.into())
    }

    /// Plain-text projection: all text leaves concatenated depth-first.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        match self {
            ContentNode::Text(s) => out.push_str(s),
            ContentNode::Element(children) => {
                for child in children {
                    child.push_text(out);
                }
            }
        }
    }
}

/// Index of a text leaf in depth-first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }
}

/// The text the user is editing, as laid out on screen.
///
/// Rectangles are in viewport coordinates; the engine converts them into
/// overlay coordinates using `bounding_rect` and `scroll_offset`.
pub trait EditableSurface {
    fn content(&self) -> ContentNode;

    /// Bounding box of a collapsed caret at `offset` characters into `leaf`.
    fn caret_rect(&self, leaf: LeafId, offset: usize) -> Option<Rect>;

    fn bounding_rect(&self) -> Rect;

    fn scroll_offset(&self) -> Point;

    /// Caret position as an absolute character index.
    fn caret_offset(&self) -> usize;

    fn set_caret_offset(&mut self, offset: usize);

    fn text(&self) -> String {
        self.content().plain_text()
    }
}

/// Visual indicator for one active feedback item.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub feedback_id: String,
    pub kind: FeedbackKind,
    /// Overlay-relative position of the feedback's end anchor.
    pub position: Point,
}

/// Layer the markers are drawn on, above the editable surface.
pub trait Overlay {
    fn clear(&mut self);
    fn append_marker(&mut self, marker: Marker);
}
