use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::analysis::AnalysisService;
use crate::autosave::{AutosaveController, AutosaveTimings, SaveOutcome, SaveStatus, SaveTrigger};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feedback::FeedbackEngine;
use crate::metrics::{count_words, TextStats};
use crate::model::Project;
use crate::preferences::Preferences;
use crate::projects::ProjectStore;
use crate::sessions::{SessionClock, SessionTracker};
use crate::storage::Storage;

/// Result of applying finished analyses.
#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub applied: usize,
    pub errors: Vec<Error>,
}

/// Single owner of all application state. Every mutation goes through
/// here, including results of analyses that ran on other tasks.
pub struct Workspace {
    projects: ProjectStore,
    sessions: SessionTracker,
    preferences: Preferences,
    feedback: FeedbackEngine,
    autosave: AutosaveController,
    session: SessionClock,
    analysis_min_chars: usize,
}

impl Workspace {
    pub fn open(
        storage: Storage,
        service: Arc<dyn AnalysisService>,
        config: &Config,
        now: Instant,
    ) -> Self {
        let projects = ProjectStore::init(storage.clone());
        let sessions = SessionTracker::init(storage.clone());
        let preferences = Preferences::load(storage);

        let current = projects.current();
        let mut feedback = FeedbackEngine::new(service);
        feedback.load(current);
        let autosave =
            AutosaveController::new(AutosaveTimings::from_config(config), &current.content, now);
        let session = SessionClock::start(current.word_count, Utc::now());
        info!(projects = projects.all().len(), current = %current.id, "workspace opened");

        Workspace {
            projects,
            sessions,
            preferences,
            feedback,
            autosave,
            session,
            analysis_min_chars: config.analysis_min_chars,
        }
    }

    pub fn projects(&self) -> &ProjectStore {
        &self.projects
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn preferences_mut(&mut self) -> &mut Preferences {
        &mut self.preferences
    }

    pub fn current(&self) -> &Project {
        self.projects.current()
    }

    pub fn feedback(&self) -> &FeedbackEngine {
        &self.feedback
    }

    pub fn feedback_mut(&mut self) -> &mut FeedbackEngine {
        &mut self.feedback
    }

    pub fn save_status(&self) -> SaveStatus {
        self.autosave.status()
    }

    pub fn stats(&self, content: &str) -> TextStats {
        TextStats::measure(content, self.session.start_words())
    }

    pub fn on_input(&mut self, content: &str, now: Instant) {
        self.autosave.on_input(content, now);
    }

    /// Run any timer-driven save that is due.
    pub fn tick(&mut self, content: &str, now: Instant) -> Option<SaveOutcome> {
        let trigger = self.autosave.due(now)?;
        Some(self.save(trigger, content, now))
    }

    pub fn save(&mut self, trigger: SaveTrigger, content: &str, now: Instant) -> SaveOutcome {
        let id = self.projects.current_id().to_string();
        let projects = &mut self.projects;
        self.autosave
            .save(trigger, content, now, |c| projects.update_content(&id, c))
    }

    /// Queue analysis of the text added since the last analyzed position,
    /// once enough new characters have accumulated.
    pub fn maybe_request_analysis(&mut self, content: &str) -> bool {
        self.analyze_new_text(content, self.analysis_min_chars)
    }

    /// Queue analysis of whatever text was added since the last analyzed
    /// position, however short.
    pub fn analyze_now(&mut self, content: &str) -> bool {
        self.analyze_new_text(content, 1)
    }

    fn analyze_new_text(&mut self, content: &str, min_chars: usize) -> bool {
        let len = content.chars().count();
        let project = self.projects.current();
        let last = project.last_analyzed_position;
        let id = project.id.clone();

        if len < last {
            // Text was deleted; start again from the new end.
            let _ = self.projects.set_last_analyzed_position(&id, len);
            return false;
        }
        if len - last < min_chars {
            return false;
        }

        let segment: String = content.chars().skip(last).collect();
        if segment.trim().is_empty() {
            return false;
        }
        self.feedback.request_analysis(&segment, last);
        let _ = self.projects.set_last_analyzed_position(&id, len);
        true
    }

    /// Fold finished analyses into the projects that requested them.
    pub fn apply_completed_analyses(&mut self) -> AnalysisReport {
        let mut report = AnalysisReport::default();
        while let Some(outcome) = self.feedback.poll_analysis() {
            match outcome.result {
                Ok(items) if items.is_empty() => {}
                Ok(items) => {
                    report.applied += items.len();
                    if outcome.project_id == self.feedback.project_id() {
                        self.feedback.append(items.clone());
                    }
                    if let Err(e) = self.projects.append_feedback(&outcome.project_id, items) {
                        report.errors.push(e);
                    }
                }
                Err(e) => {
                    warn!(project = %outcome.project_id, error = %e, "segment analysis failed");
                    report.errors.push(e);
                }
            }
        }
        report
    }

    pub fn dismiss_feedback(&mut self, feedback_id: &str) -> Result<bool> {
        if !self.feedback.dismiss(feedback_id) {
            return Ok(false);
        }
        self.sync_feedback()?;
        Ok(true)
    }

    pub fn restore_feedback(&mut self, feedback_id: &str) -> Result<bool> {
        if !self.feedback.restore(feedback_id) {
            return Ok(false);
        }
        self.sync_feedback()?;
        Ok(true)
    }

    fn sync_feedback(&mut self) -> Result<()> {
        let id = self.feedback.project_id().to_string();
        self.projects.set_feedback(&id, self.feedback.feedback())
    }

    /// Send the whole text through the model with the custom prompt and
    /// keep the reply on the current project.
    pub async fn process_text(&mut self, content: &str) -> Result<String> {
        let service = Arc::clone(self.feedback.service());
        let prompt = self.preferences.custom_prompt.clone();
        let reply = service.process_text(content, &prompt).await?;
        let id = self.projects.current_id().to_string();
        self.projects.save_ai_response(&id, &reply)?;
        Ok(reply)
    }

    /// Record the session for the current project and start a new one.
    pub fn end_session(&mut self, content: &str, now: DateTime<Utc>) -> Result<()> {
        let words = count_words(content);
        let written = self.session.words_written(words);
        let duration = self.session.elapsed_ms(now);
        let id = self.projects.current_id().to_string();
        self.session = SessionClock::start(words, now);
        self.sessions.record_session_at(now, written, duration, &id)
    }

    /// Save and close out the current project, then make `id` current.
    pub fn switch_project(&mut self, id: &str, content: &str, now: Instant) -> Result<bool> {
        if self.projects.get(id).is_none() {
            return Ok(false);
        }
        self.leave_current(content, now)?;
        self.projects.switch_to(id)?;
        self.enter_current();
        Ok(true)
    }

    pub fn create_project(&mut self, title: Option<&str>, content: &str, now: Instant) -> Result<()> {
        self.leave_current(content, now)?;
        self.projects.create(title)?;
        self.enter_current();
        Ok(())
    }

    pub fn delete_project(&mut self, id: &str) -> Result<()> {
        let was_current = self.projects.current_id() == id;
        self.projects.delete(id)?;
        if was_current {
            self.enter_current();
        }
        Ok(())
    }

    fn leave_current(&mut self, content: &str, now: Instant) -> Result<()> {
        if let SaveOutcome::Failed(e) = self.save(SaveTrigger::Manual, content, now) {
            return Err(e);
        }
        self.end_session(content, Utc::now())
    }

    fn enter_current(&mut self) {
        let current = self.projects.current();
        self.feedback.load(current);
        self.autosave.reset(&current.content);
        self.session = SessionClock::start(current.word_count, Utc::now());
    }
}
