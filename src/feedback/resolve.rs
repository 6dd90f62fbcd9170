use std::ops::Range;

use super::surface::{ContentNode, EditableSurface, LeafId, Point};

/// A text leaf and the absolute character range it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub leaf: LeafId,
    pub range: Range<usize>,
}

/// Flatten the content tree into text runs in document order.
pub fn flatten(root: &ContentNode) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut counter = 0;
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        match node {
            ContentNode::Text(s) => {
                let len = s.chars().count();
                runs.push(TextRun {
                    leaf: LeafId(runs.len()),
                    range: counter..counter + len,
                });
                counter += len;
            }
            ContentNode::Element(children) => stack.extend(children.iter().rev()),
        }
    }
    runs
}

/// Find the run holding `offset` and the offset local to that run.
///
/// An offset on the boundary between two runs belongs to the earlier one,
/// so the end of the content maps to the end of the last run. Offsets past
/// the end of the content (stale anchors) have no location.
pub fn locate(runs: &[TextRun], offset: usize) -> Option<(LeafId, usize)> {
    let total = runs.last().map_or(0, |r| r.range.end);
    if offset > total {
        return None;
    }
    let idx = runs.partition_point(|r| r.range.end < offset);
    runs.get(idx).map(|r| (r.leaf, offset - r.range.start))
}

/// Overlay-relative position of the caret at absolute `offset`.
pub fn resolve_position<S: EditableSurface + ?Sized>(
    surface: &S,
    runs: &[TextRun],
    offset: usize,
) -> Option<Point> {
    let (leaf, local) = locate(runs, offset)?;
    let caret = surface.caret_rect(leaf, local)?;
    let origin = surface.bounding_rect();
    let scroll = surface.scroll_offset();
    Some(Point {
        x: caret.left - origin.left + scroll.x,
        y: caret.top - origin.top + scroll.y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree() -> ContentNode {
        // <div>"Hello "<b>"big"</b><p>""" "world"</p></div>
        ContentNode::Element(vec![
            ContentNode::text("Hello "),
            ContentNode::Element(vec![ContentNode::text("big")]),
            ContentNode::Element(vec![ContentNode::text(""), ContentNode::text(" world")]),
        ])
    }

    #[test]
    fn flatten_walks_depth_first() {
        let runs = flatten(&tree());
        assert_eq!(
            runs,
            vec![
                TextRun { leaf: LeafId(0), range: 0..6 },
                TextRun { leaf: LeafId(1), range: 6..9 },
                TextRun { leaf: LeafId(2), range: 9..9 },
                TextRun { leaf: LeafId(3), range: 9..15 },
            ]
        );
        assert_eq!(tree().plain_text(), "Hello big world");
    }

    #[test]
    fn locate_prefers_earlier_run_on_boundaries() {
        let runs = flatten(&tree());
        assert_eq!(locate(&runs, 0), Some((LeafId(0), 0)));
        assert_eq!(locate(&runs, 3), Some((LeafId(0), 3)));
        assert_eq!(locate(&runs, 6), Some((LeafId(0), 6)));
        assert_eq!(locate(&runs, 7), Some((LeafId(1), 1)));
        assert_eq!(locate(&runs, 9), Some((LeafId(1), 3)));
        assert_eq!(locate(&runs, 10), Some((LeafId(3), 1)));
        assert_eq!(locate(&runs, 15), Some((LeafId(3), 6)));
    }

    #[test]
    fn locate_rejects_offsets_past_the_end() {
        let runs = flatten(&tree());
        assert_eq!(locate(&runs, 16), None);
        assert_eq!(locate(&[], 0), None);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let runs = flatten(&ContentNode::Element(vec![
            ContentNode::text("café"),
            ContentNode::text("!"),
        ]));
        assert_eq!(runs[0].range, 0..4);
        assert_eq!(locate(&runs, 5), Some((LeafId(1), 1)));
    }
}
