use chrono::Utc;
use tracing::info;

use crate::error::Result;
use crate::model::{Feedback, Genre, Project};
use crate::storage::{Storage, StorageKey};

/// All projects plus the current-project pointer.
///
/// Every mutation re-persists the whole collection. Once constructed the
/// store always holds at least one project and `current_id` always names
/// one of them. A failed write leaves the in-memory state updated and
/// returns the error so the caller can show it.
pub struct ProjectStore {
    storage: Storage,
    projects: Vec<Project>,
    current_id: String,
}

impl ProjectStore {
    /// Load the stored collection, creating a first project when none exist.
    pub fn init(storage: Storage) -> Self {
        let projects: Vec<Project> = storage.load_list(StorageKey::Projects).unwrap_or_default();
        let stored_current: Option<String> = storage.load(StorageKey::CurrentProject);

        if let Some(first) = projects.first() {
            let current_id = stored_current
                .filter(|id| projects.iter().any(|p| &p.id == id))
                .unwrap_or_else(|| first.id.clone());
            return ProjectStore {
                storage,
                projects,
                current_id,
            };
        }

        let first = Project::new(None);
        info!(id = %first.id, "no stored projects, created a new one");
        let store = ProjectStore {
            storage,
            current_id: first.id.clone(),
            projects: vec![first],
        };
        // Failures are logged by Storage; the fresh project still works in memory.
        let _ = store.persist();
        let _ = store.persist_current();
        store
    }

    pub fn all(&self) -> &[Project] {
        &self.projects
    }

    /// Projects ordered most recently modified first.
    pub fn by_last_modified(&self) -> Vec<&Project> {
        let mut list: Vec<&Project> = self.projects.iter().collect();
        list.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        list
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn current_id(&self) -> &str {
        &self.current_id
    }

    pub fn current(&self) -> &Project {
        // current_id always names an existing project
        self.projects
            .iter()
            .find(|p| p.id == self.current_id)
            .unwrap_or(&self.projects[0])
    }

    /// Create a project and make it current.
    pub fn create(&mut self, title: Option<&str>) -> Result<&Project> {
        let project = Project::new(title);
        info!(id = %project.id, title = %project.title, "created project");
        self.current_id = project.id.clone();
        self.projects.push(project);
        let saved = self.persist();
        let current = self.persist_current();
        saved.and(current)?;
        Ok(self.current())
    }

    /// Write content, word count and modification time together.
    pub fn update_content(&mut self, id: &str, content: &str) -> Result<()> {
        let now = Utc::now();
        self.modify(id, |p| p.set_content(content, now))
    }

    pub fn rename(&mut self, id: &str, title: &str) -> Result<()> {
        let now = Utc::now();
        self.modify(id, |p| {
            p.title = title.to_string();
            p.last_modified = now;
        })
    }

    pub fn set_genre(&mut self, id: &str, genre: Genre) -> Result<()> {
        self.modify(id, |p| p.genre = genre)
    }

    pub fn save_ai_response(&mut self, id: &str, response: &str) -> Result<()> {
        self.modify(id, |p| p.ai_response = Some(response.to_string()))
    }

    pub fn clear_ai_response(&mut self, id: &str) -> Result<()> {
        self.modify(id, |p| p.ai_response = None)
    }

    /// Append analysis results; nothing is deduplicated or merged.
    pub fn append_feedback(&mut self, id: &str, items: Vec<Feedback>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.modify(id, |p| p.inline_feedback.extend(items))
    }

    /// Replace a project's feedback list with the engine's view of it.
    pub fn set_feedback(&mut self, id: &str, items: &[Feedback]) -> Result<()> {
        self.modify(id, |p| p.inline_feedback = items.to_vec())
    }

    pub fn set_last_analyzed_position(&mut self, id: &str, position: usize) -> Result<()> {
        self.modify(id, |p| p.last_analyzed_position = position)
    }

    /// Switch the current project. Unknown ids are ignored.
    pub fn switch_to(&mut self, id: &str) -> Result<bool> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        self.current_id = id.to_string();
        self.persist_current()?;
        Ok(true)
    }

    /// Delete a project. Deleting the current project selects the first
    /// remaining one, or creates a fresh project when none remain.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != id);
        if self.projects.len() == before {
            return Ok(());
        }
        info!(id, "deleted project");
        let saved = self.persist();

        if self.current_id == id {
            if let Some(first) = self.projects.first() {
                let next = first.id.clone();
                saved?;
                self.switch_to(&next)?;
            } else {
                self.create(None)?;
                saved?;
            }
            return Ok(());
        }
        saved
    }

    fn modify<F: FnOnce(&mut Project)>(&mut self, id: &str, f: F) -> Result<()> {
        match self.projects.iter_mut().find(|p| p.id == id) {
            Some(project) => {
                f(project);
                self.persist()
            }
            None => Ok(()),
        }
    }

    fn persist(&self) -> Result<()> {
        self.storage.save(StorageKey::Projects, &self.projects)
    }

    fn persist_current(&self) -> Result<()> {
        self.storage.save(StorageKey::CurrentProject, &self.current_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeedbackKind;
    use crate::storage::{KeyValueStore, MemoryStore};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn init_creates_a_first_project() {
        let store = ProjectStore::init(Storage::in_memory());
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.current().id, store.current_id());
    }

    #[test]
    fn one_bad_feedback_item_does_not_replace_the_collection() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .set(
                "projects",
                r#"[
                    {"id": "project_novel", "title": "Novel", "content": "It begins.",
                     "created": "2024-01-01T00:00:00Z", "lastModified": "2024-01-01T00:00:00Z",
                     "wordCount": 2,
                     "inlineFeedback": [{"id": "fb_x", "type": "style", "message": "Hm",
                                         "startIndex": 0, "endIndex": 3}]},
                    {"id": "project_essay", "title": "Essay", "content": "",
                     "created": "2024-01-01T00:00:00Z", "lastModified": "2024-01-01T00:00:00Z",
                     "wordCount": 0}
                ]"#,
            )
            .unwrap();
        backend.set("current-project", r#""project_essay""#).unwrap();

        let store = ProjectStore::init(Storage::new(backend.clone()));
        let titles: Vec<&str> = store.all().iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Novel", "Essay"]);
        assert_eq!(store.current_id(), "project_essay");
        assert!(store.get("project_novel").unwrap().inline_feedback.is_empty());
        assert!(backend.get("projects").unwrap().unwrap().contains("Novel"));
    }

    #[test]
    fn unreadable_project_is_skipped_and_kept_aside() {
        let backend = Arc::new(MemoryStore::new());
        let raw = r#"[{"id": "project_a", "title": "Kept", "content": "",
                       "created": "2024-01-01T00:00:00Z", "lastModified": "2024-01-01T00:00:00Z",
                       "wordCount": 0},
                      {"title": "no id"}]"#;
        backend.set("projects", raw).unwrap();

        let store = ProjectStore::init(Storage::new(backend.clone()));
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.current().title, "Kept");
        assert_eq!(backend.get("projects.unreadable").unwrap().as_deref(), Some(raw));
    }

    #[test]
    fn update_content_recomputes_word_count() {
        let mut store = ProjectStore::init(Storage::in_memory());
        let id = store.current_id().to_string();
        let before = store.current().last_modified;
        store.update_content(&id, "one two three").unwrap();
        let project = store.current();
        assert_eq!(project.content, "one two three");
        assert_eq!(project.word_count, 3);
        assert!(project.last_modified >= before);
    }

    #[test]
    fn deleting_the_only_project_leaves_exactly_one() {
        let mut store = ProjectStore::init(Storage::in_memory());
        let id = store.current_id().to_string();
        store.delete(&id).unwrap();
        assert_eq!(store.all().len(), 1);
        assert_ne!(store.current_id(), id);
        assert!(store.get(store.current_id()).is_some());
    }

    #[test]
    fn deleting_current_project_selects_another() {
        let mut store = ProjectStore::init(Storage::in_memory());
        let first = store.current_id().to_string();
        let second = store.create(Some("Second")).unwrap().id.clone();
        assert_eq!(store.current_id(), second);

        store.delete(&second).unwrap();
        assert_eq!(store.current_id(), first);
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn deleting_other_project_keeps_current() {
        let mut store = ProjectStore::init(Storage::in_memory());
        let first = store.current_id().to_string();
        let second = store.create(Some("Second")).unwrap().id.clone();
        store.delete(&first).unwrap();
        assert_eq!(store.current_id(), second);
    }

    #[test]
    fn switch_to_unknown_id_is_ignored() {
        let mut store = ProjectStore::init(Storage::in_memory());
        let id = store.current_id().to_string();
        assert!(!store.switch_to("project_missing").unwrap());
        assert_eq!(store.current_id(), id);
    }

    #[test]
    fn reload_restores_collection_and_pointer() {
        let storage = Storage::in_memory();
        let mut store = ProjectStore::init(storage.clone());
        let a = store.current_id().to_string();
        store.update_content(&a, "alpha beta").unwrap();
        let b = store.create(Some("B")).unwrap().id.clone();
        store.update_content(&b, "gamma").unwrap();
        store
            .append_feedback(
                &b,
                vec![Feedback::for_segment(FeedbackKind::Flow, "Smooth", "gamma", 0)],
            )
            .unwrap();

        let reloaded = ProjectStore::init(storage);
        assert_eq!(reloaded.all(), store.all());
        assert_eq!(reloaded.current_id(), b);
    }

    #[test]
    fn stale_current_pointer_falls_back_to_first_project() {
        let storage = Storage::in_memory();
        let store = ProjectStore::init(storage.clone());
        let first = store.current_id().to_string();
        storage.save(StorageKey::CurrentProject, "project_gone").unwrap();

        let reloaded = ProjectStore::init(storage);
        assert_eq!(reloaded.current_id(), first);
    }

    #[test]
    fn failed_write_keeps_memory_state() {
        let backend = Arc::new(MemoryStore::new());
        let mut store = ProjectStore::init(Storage::new(backend.clone()));
        let id = store.current_id().to_string();
        backend.set_fail_writes(true);
        assert!(store.update_content(&id, "kept in memory").is_err());
        assert_eq!(store.current().content, "kept in memory");
    }

    #[test]
    fn ai_response_set_and_clear() {
        let mut store = ProjectStore::init(Storage::in_memory());
        let id = store.current_id().to_string();
        store.save_ai_response(&id, "Looks good").unwrap();
        assert_eq!(store.current().ai_response.as_deref(), Some("Looks good"));
        store.clear_ai_response(&id).unwrap();
        assert_eq!(store.current().ai_response, None);
    }
}
