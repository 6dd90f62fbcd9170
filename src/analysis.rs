use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Feedback, FeedbackKind};

pub const API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const API_VERSION: &str = "2023-06-01";

pub const DEFAULT_FEEDBACK_PROMPT: &str = "You are a supportive writing coach reading a student's draft as they write. \
Respond to the passage with a short question or observation that helps the writer improve, \
or with praise when the passage works well.";

const SEGMENT_INSTRUCTIONS: &str = "Analyze the text and provide ONE piece of feedback for the entire segment.\n\
Focus on the most important aspect that would help the student improve.\n\n\
Return your response as JSON only:\n\
{\n  \"type\": \"grammar\" | \"clarity\" | \"flow\" | \"tone\" | \"praise\",\n  \
\"message\": \"Your brief question or observation (under 25 words)\"\n}";

pub type AnalysisFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The language-model capability the writing app talks to.
pub trait AnalysisService: Send + Sync {
    /// Feedback for `segment`, which starts at absolute `start_offset` of the
    /// document. Returns at most one item, anchored at the segment's end.
    fn analyze_segment<'a>(
        &'a self,
        segment: &'a str,
        start_offset: usize,
    ) -> AnalysisFuture<'a, Vec<Feedback>>;

    /// Run the whole text through the model with a custom system prompt.
    fn process_text<'a>(&'a self, text: &'a str, prompt: &'a str) -> AnalysisFuture<'a, String>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct SegmentReply {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

/// Analysis backed by the Anthropic messages API.
pub struct AnthropicAnalyzer {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    feedback_prompt: String,
}

impl AnthropicAnalyzer {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::MissingApiKey)?;
        Ok(Self::with_key(config, api_key))
    }

    pub fn with_key(config: &Config, api_key: impl Into<String>) -> Self {
        AnthropicAnalyzer {
            client: Client::new(),
            api_key: api_key.into(),
            model: config.analysis_model.clone(),
            max_tokens: config.analysis_max_tokens,
            feedback_prompt: DEFAULT_FEEDBACK_PROMPT.to_string(),
        }
    }

    pub fn with_feedback_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.feedback_prompt = prompt.into();
        self
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens,
            system: Some(system),
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(reply_text(&body))
    }
}

/// Text of the first content block of a messages reply. A body of any
/// other shape counts as an empty reply.
fn reply_text(body: &str) -> String {
    match serde_json::from_str::<AnthropicResponse>(body) {
        Ok(parsed) => parsed
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "unexpected analysis response shape");
            String::new()
        }
    }
}

impl AnalysisService for AnthropicAnalyzer {
    fn analyze_segment<'a>(
        &'a self,
        segment: &'a str,
        start_offset: usize,
    ) -> AnalysisFuture<'a, Vec<Feedback>> {
        Box::pin(async move {
            if segment.trim().is_empty() {
                return Ok(Vec::new());
            }
            let system = format!("{}\n\n{}", self.feedback_prompt, SEGMENT_INSTRUCTIONS);
            let reply = self.complete(&system, segment, self.max_tokens).await?;
            Ok(feedback_from_reply(&reply, segment, start_offset))
        })
    }

    fn process_text<'a>(&'a self, text: &'a str, prompt: &'a str) -> AnalysisFuture<'a, String> {
        Box::pin(async move {
            if text.is_empty() {
                return Err(Error::Validation("No text received."));
            }
            if prompt.trim().is_empty() {
                return Err(Error::Validation("No system prompt received."));
            }
            self.complete(prompt.trim(), text, 1024).await
        })
    }
}

/// Stand-in used when no API key is configured: every call fails with
/// [`Error::MissingApiKey`] so the caller can report it.
pub struct Unconfigured;

impl AnalysisService for Unconfigured {
    fn analyze_segment<'a>(&'a self, _: &'a str, _: usize) -> AnalysisFuture<'a, Vec<Feedback>> {
        Box::pin(async { Err(Error::MissingApiKey) })
    }

    fn process_text<'a>(&'a self, _: &'a str, _: &'a str) -> AnalysisFuture<'a, String> {
        Box::pin(async { Err(Error::MissingApiKey) })
    }
}

/// Turn the model's JSON reply into at most one feedback item.
///
/// Anything that is not a `{type, message}` object with a known type is
/// treated as no feedback.
pub fn feedback_from_reply(reply: &str, segment: &str, start_offset: usize) -> Vec<Feedback> {
    let parsed: SegmentReply = match serde_json::from_str(strip_code_fence(reply)) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "malformed segment analysis reply");
            return Vec::new();
        }
    };
    let kind = parsed.kind.as_deref().and_then(FeedbackKind::parse);
    match (kind, parsed.message) {
        (Some(kind), Some(message)) if !message.trim().is_empty() => {
            vec![Feedback::for_segment(kind, message.trim(), segment, start_offset)]
        }
        _ => {
            debug!("segment analysis reply had no usable feedback");
            Vec::new()
        }
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

/// A finished segment analysis, tagged with the project that asked for it.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub project_id: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub result: Result<Vec<Feedback>>,
}

/// Runs segment analyses concurrently and hands results back in the order
/// they complete. Requests cannot be cancelled; late results still arrive.
pub struct AnalysisQueue {
    service: Arc<dyn AnalysisService>,
    tx: mpsc::UnboundedSender<AnalysisOutcome>,
    rx: mpsc::UnboundedReceiver<AnalysisOutcome>,
    in_flight: usize,
}

impl AnalysisQueue {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        AnalysisQueue {
            service,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn service(&self) -> &Arc<dyn AnalysisService> {
        &self.service
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Spawn an analysis on the current tokio runtime.
    pub fn submit(&mut self, project_id: &str, segment: String, start_offset: usize) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        let project_id = project_id.to_string();
        let end_offset = start_offset + segment.chars().count();
        self.in_flight += 1;
        debug!(%project_id, start_offset, end_offset, "submitting segment analysis");

        tokio::spawn(async move {
            let result = service.analyze_segment(&segment, start_offset).await;
            // The receiver only goes away when the queue is dropped.
            let _ = tx.send(AnalysisOutcome {
                project_id,
                start_offset,
                end_offset,
                result,
            });
        });
    }

    /// A completed outcome, if one is ready.
    pub fn try_next(&mut self) -> Option<AnalysisOutcome> {
        let outcome = self.rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(outcome)
    }

    /// Wait for the next completed outcome. Returns `None` when nothing is
    /// in flight.
    pub async fn next(&mut self) -> Option<AnalysisOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let outcome = self.rx.recv().await?;
        self.in_flight -= 1;
        Some(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    /// Answers every segment with one clarity note after a delay chosen
    /// from the segment's length, so shorter segments finish first.
    pub(crate) struct FakeAnalyzer {
        pub delay_per_char_ms: u64,
    }

    impl AnalysisService for FakeAnalyzer {
        fn analyze_segment<'a>(
            &'a self,
            segment: &'a str,
            start_offset: usize,
        ) -> AnalysisFuture<'a, Vec<Feedback>> {
            Box::pin(async move {
                let delay = self.delay_per_char_ms * segment.chars().count() as u64;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if segment.trim().is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![Feedback::for_segment(
                    FeedbackKind::Clarity,
                    format!("About '{}'", segment.trim()),
                    segment,
                    start_offset,
                )])
            })
        }

        fn process_text<'a>(&'a self, text: &'a str, prompt: &'a str) -> AnalysisFuture<'a, String> {
            Box::pin(async move { Ok(format!("{}: {} words", prompt, text.split_whitespace().count())) })
        }
    }

    #[test]
    fn reply_for_hello_is_anchored_at_segment_end() {
        let items = feedback_from_reply(
            r#"{"type": "grammar", "message": "Is this a question?"}"#,
            "Hello?",
            10,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].start_index, 10);
        assert_eq!(items[0].end_index, 16);
        assert_eq!(items[0].kind, FeedbackKind::Grammar);
        assert_eq!(items[0].message, "Is this a question?");
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let reply = "```json\n{\"type\": \"praise\", \"message\": \"Vivid.\"}\n```";
        assert_eq!(feedback_from_reply(reply, "abc", 0).len(), 1);
    }

    #[test]
    fn malformed_replies_yield_no_feedback() {
        assert!(feedback_from_reply("not json at all", "abc", 0).is_empty());
        assert!(feedback_from_reply(r#"{"type": "style", "message": "x"}"#, "abc", 0).is_empty());
        assert!(feedback_from_reply(r#"{"type": "tone"}"#, "abc", 0).is_empty());
        assert!(feedback_from_reply(r#"[1, 2, 3]"#, "abc", 0).is_empty());
    }

    #[test]
    fn reply_text_takes_the_first_block() {
        let body = r#"{"id": "msg_1", "content": [{"type": "text", "text": "first"}, {"type": "text", "text": "second"}]}"#;
        assert_eq!(reply_text(body), "first");
        assert_eq!(reply_text(r#"{"content": []}"#), "");
    }

    #[test]
    fn unexpected_response_bodies_mean_no_feedback() {
        for body in [r#"{"unexpected": 1}"#, "<html>busy</html>", r#"{"content": "text"}"#] {
            let reply = reply_text(body);
            assert_eq!(reply, "");
            assert!(feedback_from_reply(&reply, "Some segment.", 0).is_empty());
        }
    }

    #[test]
    fn request_body_carries_system_prompt() {
        let request = AnthropicRequest {
            model: "m",
            max_tokens: 150,
            system: Some("coach"),
            messages: vec![Message {
                role: "user",
                content: "text",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"], "coach");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn blank_segments_skip_the_model() {
        let analyzer = AnthropicAnalyzer::with_key(&Config::default(), "unused");
        let items = analyzer.analyze_segment("   \n", 4).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn process_text_validates_inputs() {
        let analyzer = AnthropicAnalyzer::with_key(&Config::default(), "unused");
        assert!(matches!(analyzer.process_text("", "prompt").await, Err(Error::Validation(_))));
        assert!(matches!(analyzer.process_text("text", "  ").await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn unconfigured_service_reports_missing_key() {
        let mut queue = AnalysisQueue::new(Arc::new(Unconfigured));
        queue.submit("p", "text".to_string(), 0);
        let outcome = queue.next().await.unwrap();
        assert!(matches!(outcome.result, Err(Error::MissingApiKey)));
    }

    #[tokio::test]
    async fn outcomes_arrive_in_completion_order() {
        let mut queue = AnalysisQueue::new(Arc::new(FakeAnalyzer { delay_per_char_ms: 5 }));
        queue.submit("p", "a fairly long first segment".to_string(), 0);
        queue.submit("p", "short".to_string(), 27);
        assert_eq!(queue.in_flight(), 2);

        let first = queue.next().await.unwrap();
        let second = queue.next().await.unwrap();
        assert_eq!(first.start_offset, 27);
        assert_eq!(first.end_offset, 32);
        assert_eq!(second.start_offset, 0);
        assert_eq!(queue.in_flight(), 0);
        assert!(queue.next().await.is_none());
    }
}
