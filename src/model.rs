use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::metrics::count_words;

pub const DEFAULT_PROJECT_TITLE: &str = "Untitled Project";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Genre {
    #[default]
    General,
    Narrative,
    Persuasive,
    Descriptive,
    Creative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Grammar,
    Clarity,
    Flow,
    Tone,
    Praise,
}

impl FeedbackKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grammar" => Some(FeedbackKind::Grammar),
            "clarity" => Some(FeedbackKind::Clarity),
            "flow" => Some(FeedbackKind::Flow),
            "tone" => Some(FeedbackKind::Tone),
            "praise" => Some(FeedbackKind::Praise),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackKind::Grammar => "grammar",
            FeedbackKind::Clarity => "clarity",
            FeedbackKind::Flow => "flow",
            FeedbackKind::Tone => "tone",
            FeedbackKind::Praise => "praise",
        }
    }
}

/// An inline annotation anchored at `[start_index, end_index)` of the plain
/// text as it was when the feedback was generated. Anchors are never
/// re-validated, so they may point past the end of edited content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub message: String,
    pub start_index: usize,
    pub end_index: usize,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub dismissed: bool,
}

impl Feedback {
    /// Feedback for a whole analyzed segment. The marker sits at the end
    /// of the segment, offsets are counted in characters.
    pub fn for_segment(
        kind: FeedbackKind,
        message: impl Into<String>,
        segment: &str,
        start_offset: usize,
    ) -> Self {
        Feedback {
            id: format!("fb_{}", Uuid::new_v4().simple()),
            kind,
            message: message.into(),
            start_index: start_offset,
            end_index: start_offset + segment.chars().count(),
            created_at: Utc::now(),
            dismissed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub word_count: usize,
    #[serde(default)]
    pub genre: Genre,
    #[serde(default)]
    pub ai_response: Option<String>,
    #[serde(default, deserialize_with = "readable_feedback")]
    pub inline_feedback: Vec<Feedback>,
    #[serde(default)]
    pub last_analyzed_position: usize,
}

impl Project {
    pub fn new(title: Option<&str>) -> Self {
        let now = Utc::now();
        Project {
            id: format!("project_{}", Uuid::new_v4().simple()),
            title: title.unwrap_or(DEFAULT_PROJECT_TITLE).to_string(),
            content: String::new(),
            created: now,
            last_modified: now,
            word_count: 0,
            genre: Genre::General,
            ai_response: None,
            inline_feedback: Vec::new(),
            last_analyzed_position: 0,
        }
    }

    /// Replace the content, keeping word count and modification time in step.
    pub fn set_content(&mut self, content: &str, now: DateTime<Utc>) {
        self.content = content.to_string();
        self.word_count = count_words(content);
        self.last_modified = now;
    }
}

/// Stored feedback lists keep the items that still parse, so one item with
/// an unknown type does not make the whole project unreadable.
fn readable_feedback<'de, D>(deserializer: D) -> Result<Vec<Feedback>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(feedback) => Some(feedback),
            Err(e) => {
                warn!(error = %e, "dropping unreadable feedback item");
                None
            }
        })
        .collect())
}

/// One stretch of writing. Sessions only reference projects by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritingSession {
    pub date: DateTime<Utc>,
    /// Milliseconds.
    pub duration: u64,
    pub words_written: i64,
    pub project_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_feedback_is_anchored_at_segment_end() {
        let fb = Feedback::for_segment(FeedbackKind::Clarity, "Who is asking?", "Hello?", 10);
        assert_eq!(fb.start_index, 10);
        assert_eq!(fb.end_index, 16);
        assert!(!fb.dismissed);
        assert!(fb.id.starts_with("fb_"));
    }

    #[test]
    fn project_json_uses_camel_case_and_type_field() {
        let mut project = Project::new(Some("Essay"));
        project.inline_feedback.push(Feedback::for_segment(
            FeedbackKind::Praise,
            "Nice opening",
            "abc",
            0,
        ));
        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["wordCount"], 0);
        assert_eq!(json["genre"], "general");
        assert_eq!(json["inlineFeedback"][0]["type"], "praise");
        assert_eq!(json["inlineFeedback"][0]["endIndex"], 3);
    }

    #[test]
    fn older_projects_without_feedback_fields_still_load() {
        let json = r#"{
            "id": "project_1",
            "title": "Old",
            "content": "some words here",
            "created": "2024-01-01T00:00:00Z",
            "lastModified": "2024-01-02T00:00:00Z",
            "wordCount": 3,
            "genre": "narrative",
            "aiResponse": null
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.genre, Genre::Narrative);
        assert!(project.inline_feedback.is_empty());
        assert_eq!(project.last_analyzed_position, 0);
    }

    #[test]
    fn unreadable_feedback_items_are_dropped_not_the_project() {
        let json = r#"{
            "id": "project_1",
            "title": "Novel",
            "content": "Call me Ishmael.",
            "created": "2024-01-01T00:00:00Z",
            "lastModified": "2024-01-02T00:00:00Z",
            "wordCount": 3,
            "inlineFeedback": [
                {"id": "fb_1", "type": "style", "message": "Odd", "startIndex": 0, "endIndex": 4,
                 "createdAt": "2024-01-02T00:00:00Z"},
                {"id": "fb_2", "type": "flow", "message": "Smooth", "startIndex": 0, "endIndex": 16}
            ]
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.title, "Novel");
        assert_eq!(project.inline_feedback.len(), 1);
        assert_eq!(project.inline_feedback[0].id, "fb_2");
        assert_eq!(project.inline_feedback[0].kind, FeedbackKind::Flow);
    }

    #[test]
    fn set_content_recounts_words() {
        let mut project = Project::new(None);
        let now = Utc::now();
        project.set_content("the quick brown fox", now);
        assert_eq!(project.word_count, 4);
        assert_eq!(project.last_modified, now);
        assert_eq!(project.title, DEFAULT_PROJECT_TITLE);
    }
}
