//! Writing workspace with inline language-model feedback.
//!
//! Projects, writing sessions and preferences persist through a key-value
//! [`storage::Storage`]. Inline feedback is anchored to character offsets
//! of the plain text and drawn as markers by [`feedback::FeedbackEngine`]
//! onto whatever surface the front-end provides.

pub mod analysis;
pub mod autosave;
pub mod config;
pub mod error;
pub mod feedback;
pub mod metrics;
pub mod model;
pub mod preferences;
pub mod projects;
pub mod schedule;
pub mod sessions;
pub mod storage;
pub mod workspace;

pub use error::{Error, Result};
