//! Inline feedback: the annotations for the active project, where their
//! markers land on the live text, and their dismiss lifecycle.

pub mod resolve;
pub mod surface;

use std::sync::Arc;

use tracing::debug;

use crate::analysis::{AnalysisOutcome, AnalysisQueue, AnalysisService};
use crate::error::Result;
use crate::model::{Feedback, Project};
use resolve::{flatten, resolve_position};
use surface::{EditableSurface, Marker, Overlay};

pub type MarkerClickHandler = Box<dyn FnMut(&str)>;

/// Draw markers for every non-dismissed item, left to right by end anchor.
///
/// The overlay is cleared and redrawn from scratch. Items whose anchor is
/// past the end of the current text are skipped. Returns what was drawn.
pub fn render_markers<S, O>(feedback: &[Feedback], surface: &S, overlay: &mut O) -> Vec<Marker>
where
    S: EditableSurface + ?Sized,
    O: Overlay + ?Sized,
{
    let mut active: Vec<&Feedback> = feedback.iter().filter(|f| !f.dismissed).collect();
    active.sort_by_key(|f| f.end_index);

    let runs = flatten(&surface.content());
    overlay.clear();

    let mut drawn = Vec::with_capacity(active.len());
    for item in active {
        let Some(position) = resolve_position(surface, &runs, item.end_index) else {
            debug!(id = %item.id, end = item.end_index, "feedback anchor outside content");
            continue;
        };
        let marker = Marker {
            feedback_id: item.id.clone(),
            kind: item.kind,
            position,
        };
        overlay.append_marker(marker.clone());
        drawn.push(marker);
    }
    drawn
}

/// Owns the inline feedback of the active project.
///
/// Items are only ever appended or have `dismissed` toggled; nothing is
/// removed, so dismissed feedback stays available for undo.
pub struct FeedbackEngine {
    project_id: String,
    items: Vec<Feedback>,
    markers: Vec<Marker>,
    on_click: Option<MarkerClickHandler>,
    queue: AnalysisQueue,
}

impl FeedbackEngine {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        FeedbackEngine {
            project_id: String::new(),
            items: Vec::new(),
            markers: Vec::new(),
            on_click: None,
            queue: AnalysisQueue::new(service),
        }
    }

    /// Take over the feedback of `project`, which becomes the active one.
    pub fn load(&mut self, project: &Project) {
        self.project_id = project.id.clone();
        self.items = project.inline_feedback.clone();
        self.markers.clear();
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Feedback> {
        self.items.iter().find(|f| f.id == id)
    }

    /// Markers drawn by the last `update_markers` call.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Append results in arrival order. Overlapping anchors are kept.
    pub fn append(&mut self, items: Vec<Feedback>) {
        self.items.extend(items);
    }

    /// Mark an item dismissed. Returns whether anything changed.
    pub fn dismiss(&mut self, id: &str) -> bool {
        self.set_dismissed(id, true)
    }

    /// Undo a dismissal. Returns whether anything changed.
    pub fn restore(&mut self, id: &str) -> bool {
        self.set_dismissed(id, false)
    }

    fn set_dismissed(&mut self, id: &str, dismissed: bool) -> bool {
        match self.items.iter_mut().find(|f| f.id == id) {
            Some(item) if item.dismissed != dismissed => {
                item.dismissed = dismissed;
                true
            }
            _ => false,
        }
    }

    pub fn update_markers<S, O>(&mut self, surface: &S, overlay: &mut O) -> usize
    where
        S: EditableSurface + ?Sized,
        O: Overlay + ?Sized,
    {
        self.markers = render_markers(&self.items, surface, overlay);
        self.markers.len()
    }

    /// Register the marker click observer, replacing any previous one.
    pub fn on_marker_click<F: FnMut(&str) + 'static>(&mut self, handler: F) {
        self.on_click = Some(Box::new(handler));
    }

    /// Called by the presentation layer when a marker is activated. Only
    /// currently drawn markers notify the observer.
    pub fn activate_marker(&mut self, feedback_id: &str) -> bool {
        if !self.markers.iter().any(|m| m.feedback_id == feedback_id) {
            return false;
        }
        match self.on_click.as_mut() {
            Some(handler) => {
                handler(feedback_id);
                true
            }
            None => false,
        }
    }

    pub fn service(&self) -> &Arc<dyn AnalysisService> {
        self.queue.service()
    }

    /// Analyze a segment and wait for the result.
    pub async fn analyze(&self, segment: &str, start_offset: usize) -> Result<Vec<Feedback>> {
        self.queue
            .service()
            .analyze_segment(segment, start_offset)
            .await
    }

    /// Queue a segment of the active project for analysis without waiting.
    pub fn request_analysis(&mut self, segment: &str, start_offset: usize) {
        let project_id = self.project_id.clone();
        self.queue.submit(&project_id, segment.to_string(), start_offset);
    }

    pub fn pending_analyses(&self) -> usize {
        self.queue.in_flight()
    }

    pub fn poll_analysis(&mut self) -> Option<AnalysisOutcome> {
        self.queue.try_next()
    }

    pub async fn next_analysis(&mut self) -> Option<AnalysisOutcome> {
        self.queue.next().await
    }
}
