/// Average adult reading speed used for the reading-time estimate.
pub const WORDS_PER_MINUTE: usize = 200;

/// Count whitespace-separated words. Blank text has no words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Count characters (not bytes), optionally leaving out whitespace.
pub fn count_characters(text: &str, include_spaces: bool) -> usize {
    if include_spaces {
        text.chars().count()
    } else {
        text.chars().filter(|c| !c.is_whitespace()).count()
    }
}

/// Minutes needed to read `word_count` words, rounded up.
pub fn estimate_reading_time(word_count: usize) -> usize {
    word_count.div_ceil(WORDS_PER_MINUTE)
}

/// Snapshot of the numbers shown in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStats {
    pub words: usize,
    pub characters: usize,
    pub reading_minutes: usize,
    /// Words gained (or lost) since the writing session started.
    pub session_words: i64,
}

impl TextStats {
    pub fn measure(text: &str, session_start_words: usize) -> Self {
        let words = count_words(text);
        TextStats {
            words,
            characters: count_characters(text, true),
            reading_minutes: estimate_reading_time(words),
            session_words: words as i64 - session_start_words as i64,
        }
    }
}
