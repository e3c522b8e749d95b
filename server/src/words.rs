use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

/// Dictionary used when no word file is configured.
pub const DEFAULT_WORDS: &[&str] = &[
    "house", "cat", "dog", "tree", "car", "sun", "computer", "book",
];

/// Fixed set of words a round's secret word is drawn from
#[derive(Debug, Clone)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    /// Builds a list, dropping blank entries.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words = words
            .into_iter()
            .map(Into::into)
            .map(|w: String| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn builtin() -> Self {
        Self::new(DEFAULT_WORDS.iter().copied())
    }

    /// Parses one word per line. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )
    }

    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&text))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    /// Picks a word uniformly at random. Repeats are allowed.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.words.choose(rng).map(String::as_str)
    }
}

impl Default for WordList {
    fn default() -> Self {
        Self::builtin()
    }
}
