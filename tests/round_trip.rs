use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use scribex::analysis::{AnalysisFuture, AnalysisService};
use scribex::config::Config;
use scribex::feedback::render_markers;
use scribex::feedback::surface::{ContentNode, EditableSurface, LeafId, Marker, Overlay, Point, Rect};
use scribex::model::{Feedback, FeedbackKind};
use scribex::projects::ProjectStore;
use scribex::storage::{FileStore, Storage};
use scribex::workspace::Workspace;
use tempfile::TempDir;

struct EchoAnalyzer;

impl AnalysisService for EchoAnalyzer {
    fn analyze_segment<'a>(
        &'a self,
        segment: &'a str,
        start_offset: usize,
    ) -> AnalysisFuture<'a, Vec<Feedback>> {
        Box::pin(async move {
            Ok(vec![Feedback::for_segment(FeedbackKind::Tone, "Consider the tone", segment, start_offset)])
        })
    }

    fn process_text<'a>(&'a self, text: &'a str, _prompt: &'a str) -> AnalysisFuture<'a, String> {
        Box::pin(async move { Ok(text.to_uppercase()) })
    }
}

/// Single-line surface where each character is one unit wide.
struct LineSurface(String);

impl EditableSurface for LineSurface {
    fn content(&self) -> ContentNode {
        ContentNode::Element(vec![ContentNode::text(self.0.as_str())])
    }

    fn caret_rect(&self, _leaf: LeafId, offset: usize) -> Option<Rect> {
        Some(Rect::new(offset as f64, 0.0, 0.0, 1.0))
    }

    fn bounding_rect(&self) -> Rect {
        Rect::default()
    }

    fn scroll_offset(&self) -> Point {
        Point::default()
    }

    fn caret_offset(&self) -> usize {
        0
    }

    fn set_caret_offset(&mut self, _offset: usize) {}
}

#[derive(Default)]
struct Collected(Vec<Marker>);

impl Overlay for Collected {
    fn clear(&mut self) {
        self.0.clear();
    }

    fn append_marker(&mut self, marker: Marker) {
        self.0.push(marker);
    }
}

fn file_storage(dir: &TempDir) -> Storage {
    Storage::new(Arc::new(FileStore::new(dir.path())))
}

#[test]
fn projects_survive_reload_from_disk() {
    let dir = TempDir::new().unwrap();
    let mut store = ProjectStore::init(file_storage(&dir));
    let first = store.current_id().to_string();
    store.update_content(&first, "It was a dark and stormy night").unwrap();
    let second = store.create(Some("Essay")).unwrap().id.clone();
    store.update_content(&second, "Thesis first.").unwrap();

    let reloaded = ProjectStore::init(file_storage(&dir));
    let summary = |s: &ProjectStore| {
        s.all()
            .iter()
            .map(|p| (p.id.clone(), p.content.clone(), p.word_count))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&reloaded), summary(&store));
    assert_eq!(reloaded.current_id(), second);
}

#[test]
fn deleting_the_only_project_leaves_a_fresh_one_on_disk() {
    let dir = TempDir::new().unwrap();
    let mut store = ProjectStore::init(file_storage(&dir));
    let only = store.current_id().to_string();
    store.delete(&only).unwrap();

    let reloaded = ProjectStore::init(file_storage(&dir));
    assert_eq!(reloaded.all().len(), 1);
    assert_ne!(reloaded.current_id(), only);
    assert_eq!(reloaded.current_id(), store.current_id());
}

#[test]
fn corrupt_project_file_starts_fresh() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("projects.json"), "[{ broken").unwrap();
    let store = ProjectStore::init(file_storage(&dir));
    assert_eq!(store.all().len(), 1);

    let kept = std::fs::read_to_string(dir.path().join("projects.unreadable.json")).unwrap();
    assert_eq!(kept, "[{ broken");
}

#[test]
fn unknown_feedback_type_keeps_stored_projects() {
    let dir = TempDir::new().unwrap();
    let stored = r#"[
        {"id": "project_novel", "title": "Novel", "content": "Chapter one.",
         "created": "2024-03-01T09:00:00Z", "lastModified": "2024-03-02T09:00:00Z",
         "wordCount": 2, "genre": "narrative", "aiResponse": null, "lastAnalyzedPosition": 12,
         "inlineFeedback": [
            {"id": "fb_old", "type": "style", "message": "Vary the rhythm",
             "startIndex": 0, "endIndex": 12, "createdAt": "2024-03-02T09:00:00Z", "dismissed": false}
         ]},
        {"id": "project_essay", "title": "Essay", "content": "Thesis.",
         "created": "2024-03-01T09:00:00Z", "lastModified": "2024-03-01T09:00:00Z",
         "wordCount": 1}
    ]"#;
    std::fs::write(dir.path().join("projects.json"), stored).unwrap();

    let mut store = ProjectStore::init(file_storage(&dir));
    let titles: Vec<&str> = store.all().iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Novel", "Essay"]);
    store.update_content("project_essay", "Thesis, revised.").unwrap();

    let reloaded = ProjectStore::init(file_storage(&dir));
    let novel = reloaded.get("project_novel").unwrap();
    assert_eq!(novel.content, "Chapter one.");
    assert_eq!(novel.last_analyzed_position, 12);
    assert_eq!(reloaded.get("project_essay").unwrap().word_count, 2);
}

#[tokio::test]
async fn feedback_flows_from_analysis_to_markers_and_disk() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        analysis_min_chars: 5,
        ..Config::default()
    };
    let t0 = Instant::now();
    let mut ws = Workspace::open(file_storage(&dir), Arc::new(EchoAnalyzer), &config, t0);

    let text = "Hello there, reader.";
    ws.on_input(text, t0);
    assert!(ws.maybe_request_analysis(text));
    while ws.feedback().pending_analyses() > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        ws.apply_completed_analyses();
    }
    ws.tick(text, t0 + Duration::from_secs(3));

    let mut overlay = Collected::default();
    let surface = LineSurface(text.to_string());
    assert_eq!(ws.feedback_mut().update_markers(&surface, &mut overlay), 1);
    assert_eq!(overlay.0[0].position, Point::new(20.0, 0.0));

    // Deleting text leaves the anchor stale: no marker, item kept.
    let shorter = LineSurface("Hello".to_string());
    let drawn = render_markers(ws.feedback().feedback(), &shorter, &mut overlay);
    assert!(drawn.is_empty());
    assert_eq!(ws.feedback().feedback().len(), 1);

    let reloaded = ProjectStore::init(file_storage(&dir));
    let project = reloaded.current();
    assert_eq!(project.content, text);
    assert_eq!(project.inline_feedback.len(), 1);
    assert_eq!(project.inline_feedback[0].end_index, 20);
    assert_eq!(project.last_analyzed_position, 20);
}
