//! Navigation state of one active find session
use crate::client::{BufferId, BufferVersion};
use crate::error::Result;
use crate::search::matcher::{next_char_boundary, MatchSpan, Matcher};
use crate::search::scanner::{scan_all, ScanBudget, Scanner};
use crate::search::{Direction, SearchOptions};
use log::debug;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Searching,
    Found,
    NotFound,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Searching => write!(f, "searching"),
            SessionPhase::Found => write!(f, "found"),
            SessionPhase::NotFound => write!(f, "not found"),
        }
    }
}

/// Result of a navigation step. Not finding anything is an ordinary outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindOutcome {
    Found(MatchSpan),
    NotFound,
}

impl FindOutcome {
    pub fn span(&self) -> Option<&MatchSpan> {
        match self {
            FindOutcome::Found(span) => Some(span),
            FindOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, FindOutcome::Found(_))
    }
}

/// Manages the find session lifecycle for one buffer
pub struct SearchSession {
    matcher: Arc<Matcher>,
    options: SearchOptions,
    phase: SessionPhase,
    current: Option<MatchSpan>,
    snapshot: Option<Vec<MatchSpan>>,
    buffer: Option<(BufferId, BufferVersion)>,
}

impl SearchSession {
    pub fn new(matcher: Arc<Matcher>, options: SearchOptions) -> Self {
        Self {
            matcher,
            options,
            phase: SessionPhase::Idle,
            current: None,
            snapshot: None,
            buffer: None,
        }
    }

    pub fn matcher(&self) -> &Arc<Matcher> {
        &self.matcher
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current_match(&self) -> Option<&MatchSpan> {
        self.current.as_ref()
    }

    /// Cached match count, if the buffer has not changed since it was taken.
    pub fn total_match_count(&self) -> Option<usize> {
        self.snapshot.as_ref().map(Vec::len)
    }

    pub fn buffer_id(&self) -> Option<BufferId> {
        self.buffer.map(|(id, _)| id)
    }

    /// Bring the session up to date with the buffer. Any change of identity or
    /// version drops the current match and the cached snapshot. Returns
    /// whether the session was stale.
    pub fn sync(&mut self, id: BufferId, version: BufferVersion) -> bool {
        if self.buffer == Some((id, version)) {
            return false;
        }
        if self.buffer.is_some() {
            debug!("Buffer {id:?} changed to version {version:?}; discarding cached matches");
        }
        self.buffer = Some((id, version));
        self.current = None;
        self.snapshot = None;
        true
    }

    /// Record an edit made by the finder itself: the buffer is now at
    /// `version` and no match is current.
    pub fn record_edit(&mut self, version: BufferVersion) {
        if let Some((_, v)) = self.buffer.as_mut() {
            *v = version;
        }
        self.current = None;
        self.snapshot = None;
    }

    /// Step to the next or previous match relative to `selection`.
    ///
    /// When the selection is the current match, stepping continues past it;
    /// otherwise the search starts at the selection (its end going forward,
    /// its start going backward). On error the session is left unchanged.
    pub fn find(
        &mut self,
        text: &str,
        selection: Range<usize>,
        direction: Direction,
        budget: &ScanBudget,
    ) -> Result<FindOutcome> {
        let previous = self.phase;
        self.phase = SessionPhase::Searching;

        match self.locate(text, selection, direction, budget) {
            Ok(Some(span)) => {
                debug!("Found match at {}..{}", span.start, span.end);
                self.current = Some(span.clone());
                self.phase = SessionPhase::Found;
                Ok(FindOutcome::Found(span))
            }
            Ok(None) => {
                debug!("No match for {:?}", self.matcher.source());
                self.current = None;
                self.phase = SessionPhase::NotFound;
                Ok(FindOutcome::NotFound)
            }
            Err(err) => {
                self.phase = previous;
                Err(err)
            }
        }
    }

    fn locate(
        &self,
        text: &str,
        selection: Range<usize>,
        direction: Direction,
        budget: &ScanBudget,
    ) -> Result<Option<MatchSpan>> {
        let scope = self.options.scope.resolve(text.len());
        let wrap = self.options.wrap_around;
        let current = self
            .current
            .as_ref()
            .filter(|c| c.range() == selection);

        if direction == Direction::Backward {
            let from = current.map_or(selection.start, |c| c.start);
            if let Some(snapshot) = &self.snapshot {
                return Ok(previous_in(snapshot, from, wrap));
            }
            let mut scanner = Scanner::new(&self.matcher, text, scope, from, direction, wrap)?
                .with_budget(budget.clone());
            return scanner.next().transpose();
        }

        let (from, resume) = match current {
            Some(c) if c.is_empty() && c.end < scope.end => (next_char_boundary(text, c.end), None),
            Some(c) if c.is_empty() => {
                if !wrap {
                    return Ok(None);
                }
                (scope.start, None)
            }
            Some(c) => (c.end, Some(c.end)),
            None => (selection.end, None),
        };

        let mut scanner = Scanner::new(&self.matcher, text, scope, from, direction, wrap)?
            .with_budget(budget.clone());
        if let Some(end) = resume {
            scanner = scanner.resume_after(end);
        }
        scanner.next().transpose()
    }

    /// Every match in scope; cached until the buffer changes.
    pub fn find_all(&mut self, text: &str, budget: &ScanBudget) -> Result<&[MatchSpan]> {
        if self.snapshot.is_none() {
            let scope = self.options.scope.resolve(text.len());
            let spans = scan_all(&self.matcher, text, scope, budget)?;
            debug!("Cached {} match(es) for {:?}", spans.len(), self.matcher.source());
            self.snapshot = Some(spans);
        }
        Ok(self.snapshot.as_deref().unwrap_or(&[]))
    }

    pub fn count_all(&mut self, text: &str, budget: &ScanBudget) -> Result<usize> {
        self.find_all(text, budget).map(<[MatchSpan]>::len)
    }

    /// Zero-based position of the current match among all matches, when both
    /// are known.
    pub fn current_match_index(&self) -> Option<usize> {
        let current = self.current.as_ref()?;
        let snapshot = self.snapshot.as_ref()?;
        let index = snapshot.partition_point(|s| s.start < current.start);
        snapshot[index..]
            .iter()
            .take_while(|s| s.start == current.start)
            .position(|s| s.same_range(current))
            .map(|offset| index + offset)
    }

    /// End the session.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Idle;
        self.current = None;
        self.snapshot = None;
        self.buffer = None;
    }
}

fn previous_in(snapshot: &[MatchSpan], from: usize, wrap: bool) -> Option<MatchSpan> {
    let index = snapshot.partition_point(|s| s.start < from);
    if index > 0 {
        return Some(snapshot[index - 1].clone());
    }
    if wrap {
        return snapshot.last().cloned();
    }
    None
}
