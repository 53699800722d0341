//! Find and replace engine: query compilation, scanning, replacement and
//! navigation state.
pub mod batch;
pub mod cache;
pub mod escape;
pub mod matcher;
pub mod replace;
pub mod scanner;
pub mod session;

use serde::{Deserialize, Serialize};
use std::ops::Range;

pub use batch::{BatchResult, MultipleReplacement, ReplacementRule};
pub use cache::MatcherCache;
pub use escape::{quote_literal, ESCAPE_CHARACTER};
pub use matcher::{compile, CapturedGroup, MatchSpan, Matcher, MatcherKind};
pub use replace::{replace_all, replace_one, ReplaceResult, ReplaceTemplate, TextEdit};
pub use scanner::{scan_all, CancellationToken, ScanBudget, Scanner};
pub use session::{FindOutcome, SearchSession, SessionPhase};

/// Region of the buffer a search operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    WholeDocument,
    Range { start: usize, end: usize },
}

impl SearchScope {
    pub fn range(range: Range<usize>) -> Self {
        SearchScope::Range {
            start: range.start,
            end: range.end,
        }
    }

    /// Resolve against a buffer of `len` bytes. The range is returned as-is;
    /// bounds checking happens in the scanner.
    pub fn resolve(&self, len: usize) -> Range<usize> {
        match self {
            SearchScope::WholeDocument => 0..len,
            SearchScope::Range { start, end } => *start..*end,
        }
    }
}

/// Search options
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub regex: bool,
    pub wrap_around: bool,
    pub scope: SearchScope,
    pub escapes_enabled: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            whole_word: false,
            regex: false,
            wrap_around: true,
            scope: SearchScope::WholeDocument,
            escapes_enabled: false,
        }
    }
}

impl SearchOptions {
    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.case_sensitive = value;
        self
    }

    pub fn whole_word(mut self, value: bool) -> Self {
        self.whole_word = value;
        self
    }

    pub fn regex(mut self, value: bool) -> Self {
        self.regex = value;
        self
    }

    pub fn wrap_around(mut self, value: bool) -> Self {
        self.wrap_around = value;
        self
    }

    pub fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn escapes(mut self, value: bool) -> Self {
        self.escapes_enabled = value;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}
