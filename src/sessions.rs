use std::collections::HashSet;

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use tracing::debug;

use crate::error::Result;
use crate::model::WritingSession;
use crate::storage::{Storage, StorageKey};

/// Sessions older than this are dropped whenever a session is written.
pub const RETENTION_DAYS: i64 = 30;

/// Append-only log of writing sessions with streak and daily totals.
pub struct SessionTracker {
    storage: Storage,
    sessions: Vec<WritingSession>,
}

impl SessionTracker {
    pub fn init(storage: Storage) -> Self {
        let sessions = storage.load_list(StorageKey::Sessions).unwrap_or_default();
        SessionTracker { storage, sessions }
    }

    pub fn sessions(&self) -> &[WritingSession] {
        &self.sessions
    }

    pub fn total_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn record_session(
        &mut self,
        words_written: i64,
        duration_ms: u64,
        project_id: &str,
    ) -> Result<()> {
        self.record_session_at(Utc::now(), words_written, duration_ms, project_id)
    }

    /// Append a session dated `now`, prune to the retention window, persist.
    pub fn record_session_at(
        &mut self,
        now: DateTime<Utc>,
        words_written: i64,
        duration_ms: u64,
        project_id: &str,
    ) -> Result<()> {
        self.sessions.push(WritingSession {
            date: now,
            duration: duration_ms,
            words_written,
            project_id: project_id.to_string(),
        });
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let before = self.sessions.len();
        self.sessions.retain(|s| s.date > cutoff);
        if self.sessions.len() != before {
            debug!(pruned = before - self.sessions.len(), "pruned old writing sessions");
        }
        self.storage.save(StorageKey::Sessions, &self.sessions)
    }

    pub fn calculate_streak(&self) -> usize {
        self.calculate_streak_on(Local::now().date_naive())
    }

    /// Consecutive local calendar days with writing, ending today, or
    /// yesterday when nothing has been written yet today.
    pub fn calculate_streak_on(&self, today: NaiveDate) -> usize {
        let days: HashSet<NaiveDate> = self.sessions.iter().map(|s| local_day(&s.date)).collect();
        if days.is_empty() {
            return 0;
        }

        let mut cursor = today;
        if !days.contains(&cursor) {
            match cursor.pred_opt() {
                Some(yesterday) => cursor = yesterday,
                None => return 0,
            }
        }

        let mut streak = 0;
        while days.contains(&cursor) {
            streak += 1;
            match cursor.pred_opt() {
                Some(prev) => cursor = prev,
                None => break,
            }
        }
        streak
    }

    pub fn todays_words(&self) -> i64 {
        self.words_on(Local::now().date_naive())
    }

    /// Sum of words written across sessions on the given local day.
    pub fn words_on(&self, day: NaiveDate) -> i64 {
        self.sessions
            .iter()
            .filter(|s| local_day(&s.date) == day)
            .map(|s| s.words_written)
            .sum()
    }
}

fn local_day(date: &DateTime<Utc>) -> NaiveDate {
    date.with_timezone(&Local).date_naive()
}

/// Start point of the session currently being written.
#[derive(Debug, Clone)]
pub struct SessionClock {
    start_words: usize,
    started_at: DateTime<Utc>,
}

impl SessionClock {
    pub fn start(start_words: usize, now: DateTime<Utc>) -> Self {
        SessionClock {
            start_words,
            started_at: now,
        }
    }

    pub fn start_words(&self) -> usize {
        self.start_words
    }

    /// Words gained since the start. Deleting text makes this negative.
    pub fn words_written(&self, current_words: usize) -> i64 {
        current_words as i64 - self.start_words as i64
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_milliseconds().max(0) as u64
    }
}
