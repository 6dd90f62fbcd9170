use crate::analysis::DEFAULT_FEEDBACK_PROMPT;
use crate::error::Result;
use crate::storage::{Storage, StorageKey};

pub const DEFAULT_FONT_FAMILY: &str = "'Courier New', monospace";
pub const DEFAULT_FONT_SIZE: &str = "16px";

/// Display preferences and the custom prompt used for full-text processing.
pub struct Preferences {
    storage: Storage,
    pub font_family: String,
    pub font_size: String,
    pub custom_prompt: String,
}

impl Preferences {
    pub fn load(storage: Storage) -> Self {
        let font_family = storage
            .load(StorageKey::FontFamily)
            .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string());
        let font_size = storage
            .load(StorageKey::FontSize)
            .unwrap_or_else(|| DEFAULT_FONT_SIZE.to_string());
        let custom_prompt = storage
            .load(StorageKey::CustomPrompt)
            .unwrap_or_else(|| DEFAULT_FEEDBACK_PROMPT.to_string());
        Preferences {
            storage,
            font_family,
            font_size,
            custom_prompt,
        }
    }

    pub fn set_font_family(&mut self, family: &str) -> Result<()> {
        self.font_family = family.to_string();
        self.storage.save(StorageKey::FontFamily, family)
    }

    pub fn set_font_size(&mut self, size: &str) -> Result<()> {
        self.font_size = size.to_string();
        self.storage.save(StorageKey::FontSize, size)
    }

    pub fn set_custom_prompt(&mut self, prompt: &str) -> Result<()> {
        self.custom_prompt = prompt.to_string();
        self.storage.save(StorageKey::CustomPrompt, prompt)
    }

    /// Back to defaults; the stored values are removed.
    pub fn reset(&mut self) -> Result<()> {
        self.font_family = DEFAULT_FONT_FAMILY.to_string();
        self.font_size = DEFAULT_FONT_SIZE.to_string();
        self.custom_prompt = DEFAULT_FEEDBACK_PROMPT.to_string();
        for key in [StorageKey::FontFamily, StorageKey::FontSize, StorageKey::CustomPrompt] {
            self.storage.remove(key)?;
        }
        Ok(())
    }
}
