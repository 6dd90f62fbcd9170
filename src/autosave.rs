use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::schedule::{DelayedTask, RepeatingTask};

/// What the save indicator shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Hidden,
    Unsaved,
    Saving,
    Saved,
    Error,
}

impl SaveStatus {
    pub fn label(self) -> &'static str {
        match self {
            SaveStatus::Hidden => "",
            SaveStatus::Unsaved => "Unsaved changes",
            SaveStatus::Saving => "Saving...",
            SaveStatus::Saved => "All changes saved",
            SaveStatus::Error => "Error saving draft",
        }
    }
}

/// Why a save was attempted. Every trigger ends up in the same save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Interval,
    Debounce,
    Blur,
    VisibilityLost,
    Unload,
    Manual,
}

#[derive(Debug)]
pub enum SaveOutcome {
    /// Content matched what was last persisted; nothing was written.
    Unchanged,
    Saved,
    Failed(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveTimings {
    pub interval: Duration,
    pub debounce: Duration,
    pub saved_display: Duration,
    pub error_display: Duration,
}

impl Default for AutosaveTimings {
    fn default() -> Self {
        AutosaveTimings {
            interval: Duration::from_secs(30),
            debounce: Duration::from_millis(2000),
            saved_display: Duration::from_millis(2000),
            error_display: Duration::from_millis(5000),
        }
    }
}

impl AutosaveTimings {
    pub fn from_config(config: &Config) -> Self {
        AutosaveTimings {
            interval: Duration::from_secs(config.autosave_interval_seconds),
            debounce: Duration::from_millis(config.autosave_debounce_ms),
            saved_display: Duration::from_millis(config.saved_display_ms),
            error_display: Duration::from_millis(config.error_display_ms),
        }
    }
}

/// Decides when the active project's content is persisted and tracks the
/// `hidden -> unsaved -> saving -> saved -> hidden` indicator cycle.
pub struct AutosaveController {
    timings: AutosaveTimings,
    status: SaveStatus,
    last_saved: String,
    interval: RepeatingTask,
    debounce: DelayedTask,
    hide: DelayedTask,
}

impl AutosaveController {
    pub fn new(timings: AutosaveTimings, persisted: &str, now: Instant) -> Self {
        AutosaveController {
            timings,
            status: SaveStatus::Hidden,
            last_saved: persisted.to_string(),
            interval: RepeatingTask::new(now, timings.interval),
            debounce: DelayedTask::new(),
            hide: DelayedTask::new(),
        }
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn is_dirty(&self, content: &str) -> bool {
        content != self.last_saved
    }

    /// Forget pending work and treat `persisted` as saved, e.g. after
    /// switching projects.
    pub fn reset(&mut self, persisted: &str) {
        self.last_saved = persisted.to_string();
        self.status = SaveStatus::Hidden;
        self.debounce.cancel();
        self.hide.cancel();
    }

    /// A keystroke changed the content. Restarts the quiet-period timer.
    pub fn on_input(&mut self, content: &str, now: Instant) {
        if self.is_dirty(content) {
            self.status = SaveStatus::Unsaved;
            self.hide.cancel();
        }
        self.debounce.schedule(now, self.timings.debounce);
    }

    /// Advance timers. Returns a trigger when a save should run now.
    pub fn due(&mut self, now: Instant) -> Option<SaveTrigger> {
        if self.hide.poll(now) && matches!(self.status, SaveStatus::Saved | SaveStatus::Error) {
            self.status = SaveStatus::Hidden;
        }
        let interval = self.interval.poll(now);
        let debounce = self.debounce.poll(now);
        if debounce {
            Some(SaveTrigger::Debounce)
        } else if interval {
            Some(SaveTrigger::Interval)
        } else {
            None
        }
    }

    /// Persist `content` through `persist` unless it is already saved.
    pub fn save<F>(&mut self, trigger: SaveTrigger, content: &str, now: Instant, persist: F) -> SaveOutcome
    where
        F: FnOnce(&str) -> Result<()>,
    {
        self.debounce.cancel();
        if !self.is_dirty(content) {
            return SaveOutcome::Unchanged;
        }

        self.status = SaveStatus::Saving;
        match persist(content) {
            Ok(()) => {
                debug!(?trigger, "draft saved");
                self.last_saved = content.to_string();
                self.status = SaveStatus::Saved;
                self.hide.schedule(now, self.timings.saved_display);
                SaveOutcome::Saved
            }
            Err(e) => {
                warn!(?trigger, error = %e, "failed to save draft");
                self.status = SaveStatus::Error;
                self.hide.schedule(now, self.timings.error_display);
                SaveOutcome::Failed(e)
            }
        }
    }
}
