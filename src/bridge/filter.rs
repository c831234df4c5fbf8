//! Message filtering with regex patterns.
//!
//! Blocks envelopes matching any configured pattern from being mirrored,
//! to keep spam or unwanted messages out of bridged channels.

use fancy_regex::Regex;
use tracing::warn;

/// Relay filter that checks rendered envelopes against regex patterns.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    patterns: Vec<CompiledPattern>,
}

/// A compiled regex pattern with its original string for debugging.
#[derive(Debug, Clone)]
struct CompiledPattern {
    original: String,
    regex: Regex,
}

impl MessageFilter {
    /// Create a new message filter from pattern strings.
    ///
    /// Invalid regex patterns are logged and skipped.
    pub fn new(patterns: Option<Vec<String>>) -> Self {
        Self {
            patterns: compile_patterns(patterns.unwrap_or_default()),
        }
    }

    /// Create an empty filter that allows all messages.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if the message matches any pattern and should be blocked.
    pub fn should_filter(&self, message: &str) -> bool {
        self.patterns.iter().any(|p| {
            p.regex.is_match(message).unwrap_or_else(|e| {
                warn!("Regex match error for pattern '{}': {}", p.original, e);
                false
            })
        })
    }

    /// Returns true if the filter has any patterns configured.
    pub fn has_patterns(&self) -> bool {
        !self.patterns.is_empty()
    }
}

/// Compile a list of regex pattern strings, skipping invalid ones.
fn compile_patterns(patterns: Vec<String>) -> Vec<CompiledPattern> {
    patterns
        .into_iter()
        .filter_map(|pattern| match Regex::new(&pattern) {
            Ok(regex) => Some(CompiledPattern {
                original: pattern,
                regex,
            }),
            Err(e) => {
                warn!("Invalid filter regex pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
}
