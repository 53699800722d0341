//! Lazy match scanning over a scope of the buffer
use crate::error::{CancelReason, FinderError, Result};
use crate::search::matcher::{next_char_boundary, MatchSpan, Matcher};
use crate::search::Direction;
use log::{debug, warn};
use std::iter::Rev;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::vec;

/// Cooperative cancellation flag checked by the scanner between candidates.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for the next operation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Limits for a single scan.
#[derive(Debug, Clone, Default)]
pub struct ScanBudget {
    pub cancel: Option<CancellationToken>,
    pub max_scan_bytes: Option<usize>,
}

impl ScanBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_max_scan_bytes(mut self, limit: usize) -> Self {
        self.max_scan_bytes = Some(limit);
        self
    }
}

struct Meter {
    budget: ScanBudget,
    scanned: usize,
}

impl Meter {
    fn check(&self) -> Result<()> {
        match &self.budget.cancel {
            Some(token) if token.is_cancelled() => {
                Err(FinderError::Cancelled(CancelReason::Requested))
            }
            _ => Ok(()),
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<()> {
        self.scanned += bytes;
        match self.budget.max_scan_bytes {
            Some(limit) if self.scanned > limit => {
                Err(FinderError::Cancelled(CancelReason::BudgetExhausted { limit }))
            }
            _ => Ok(()),
        }
    }
}

/// Leftmost-first forward walk over `text` up to `end`. `cursor` is `None`
/// once `end` has been passed.
struct Walk {
    cursor: Option<usize>,
    end: usize,
    last_end: Option<usize>,
}

impl Walk {
    fn new(cursor: usize, end: usize) -> Self {
        Self {
            cursor: Some(cursor),
            end,
            last_end: None,
        }
    }

    fn next_span(&mut self, matcher: &Matcher, text: &str, meter: &mut Meter) -> Result<Option<MatchSpan>> {
        loop {
            meter.check()?;
            let Some(cursor) = self.cursor else {
                return Ok(None);
            };

            let Some(span) = matcher.find_in(text, cursor..self.end) else {
                meter.charge(self.end - cursor)?;
                self.cursor = None;
                return Ok(None);
            };

            if span.is_empty() && self.last_end == Some(span.start) {
                // Empty match touching the previous match.
                self.cursor = self.step_past(text, span.start);
                continue;
            }

            meter.charge(span.end - cursor)?;
            self.cursor = if span.is_empty() {
                self.step_past(text, span.end)
            } else {
                Some(span.end)
            };
            self.last_end = Some(span.end);
            return Ok(Some(span));
        }
    }

    fn step_past(&self, text: &str, pos: usize) -> Option<usize> {
        (pos < self.end).then(|| next_char_boundary(text, pos))
    }
}

enum State {
    Forward { walk: Walk, wrapped: bool },
    Backward {
        walk: Walk,
        pending: Option<MatchSpan>,
        before: Option<Rev<vec::IntoIter<MatchSpan>>>,
        after: Option<Rev<vec::IntoIter<MatchSpan>>>,
    },
    Done,
}

/// Lazy sequence of matches inside a scope, starting from an offset.
///
/// Forward scans yield matches with `start >= from`, then, when wrapping,
/// matches from the scope start with `start < from`. Backward scans yield the
/// greatest `start < from` first, then wrap to the end of the scope. Each match
/// is reported at most once and the sequence ends after one full cycle.
pub struct Scanner<'m, 't> {
    matcher: &'m Matcher,
    text: &'t str,
    scope: Range<usize>,
    origin: usize,
    wrap: bool,
    meter: Meter,
    state: State,
}

impl<'m, 't> Scanner<'m, 't> {
    /// Fails with `ScopeOutOfRange` when `scope` does not fit the buffer or
    /// splits a character. `from` is clamped into the scope.
    ///
    /// Matches must lie inside the scope, but whole-word checks and anchors
    /// look at the text on either side of it.
    pub fn new(
        matcher: &'m Matcher,
        text: &'t str,
        scope: Range<usize>,
        from: usize,
        direction: Direction,
        wrap: bool,
    ) -> Result<Self> {
        validate_scope(text, &scope)?;

        let mut origin = from.clamp(scope.start, scope.end);
        while !text.is_char_boundary(origin) {
            origin += 1;
        }

        let state = match direction {
            Direction::Forward => State::Forward {
                walk: Walk::new(origin, scope.end),
                wrapped: false,
            },
            Direction::Backward => State::Backward {
                walk: Walk::new(scope.start, scope.end),
                pending: None,
                before: None,
                after: None,
            },
        };

        Ok(Self {
            matcher,
            text,
            scope,
            origin,
            wrap,
            meter: Meter {
                budget: ScanBudget::default(),
                scanned: 0,
            },
            state,
        })
    }

    pub fn with_budget(mut self, budget: ScanBudget) -> Self {
        self.meter.budget = budget;
        self
    }

    /// Continue after a match that ended at `end`: an empty match exactly at
    /// `end` is not reported.
    pub fn resume_after(mut self, end: usize) -> Self {
        if let State::Forward { walk, .. } = &mut self.state {
            if end == self.origin {
                walk.last_end = Some(self.origin);
            }
        }
        self
    }

    pub fn bytes_scanned(&self) -> usize {
        self.meter.scanned
    }

    fn advance(&mut self) -> Result<Option<MatchSpan>> {
        let matcher = self.matcher;
        let text = self.text;
        let origin = self.origin;

        match &mut self.state {
            State::Done => Ok(None),
            State::Forward { walk, wrapped } => loop {
                match walk.next_span(matcher, text, &mut self.meter)? {
                    Some(span) if *wrapped && span.start >= origin => {
                        self.state = State::Done;
                        return Ok(None);
                    }
                    Some(span) => return Ok(Some(span)),
                    None if !*wrapped && self.wrap && origin > self.scope.start => {
                        debug!("Scan wrapped to scope start");
                        *walk = Walk::new(self.scope.start, self.scope.end);
                        *wrapped = true;
                    }
                    None => {
                        self.state = State::Done;
                        return Ok(None);
                    }
                }
            },
            State::Backward {
                walk,
                pending,
                before,
                after,
            } => {
                if before.is_none() {
                    let mut spans = Vec::new();
                    while let Some(span) = walk.next_span(matcher, text, &mut self.meter)? {
                        if span.start >= origin {
                            *pending = Some(span);
                            break;
                        }
                        spans.push(span);
                    }
                    *before = Some(spans.into_iter().rev());
                }

                if let Some(span) = before.as_mut().and_then(Iterator::next) {
                    return Ok(Some(span));
                }
                if !self.wrap {
                    self.state = State::Done;
                    return Ok(None);
                }

                if after.is_none() {
                    let mut spans: Vec<MatchSpan> = pending.take().into_iter().collect();
                    while let Some(span) = walk.next_span(matcher, text, &mut self.meter)? {
                        spans.push(span);
                    }
                    debug!("Backward scan wrapped to scope end");
                    *after = Some(spans.into_iter().rev());
                }

                match after.as_mut().and_then(Iterator::next) {
                    Some(span) => Ok(Some(span)),
                    None => {
                        self.state = State::Done;
                        Ok(None)
                    }
                }
            }
        }
    }
}

impl Iterator for Scanner<'_, '_> {
    type Item = Result<MatchSpan>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(span) => span.map(Ok),
            Err(err) => {
                warn!("Scan stopped after {} bytes: {err}", self.meter.scanned);
                self.state = State::Done;
                Some(Err(err))
            }
        }
    }
}

/// Check that `scope` lies inside `text` on char boundaries.
pub fn validate_scope(text: &str, scope: &Range<usize>) -> Result<()> {
    let valid = scope.start <= scope.end
        && scope.end <= text.len()
        && text.is_char_boundary(scope.start)
        && text.is_char_boundary(scope.end);
    if valid {
        Ok(())
    } else {
        warn!(
            "Scope {}..{} does not fit a buffer of {} bytes",
            scope.start,
            scope.end,
            text.len()
        );
        Err(FinderError::ScopeOutOfRange {
            scope: scope.clone(),
            buffer_len: text.len(),
        })
    }
}

/// Every match in the scope, ascending and non-overlapping.
pub fn scan_all(
    matcher: &Matcher,
    text: &str,
    scope: Range<usize>,
    budget: &ScanBudget,
) -> Result<Vec<MatchSpan>> {
    let from = scope.start;
    let mut scanner =
        Scanner::new(matcher, text, scope, from, Direction::Forward, false)?.with_budget(budget.clone());
    let spans = scanner.by_ref().collect::<Result<Vec<_>>>()?;
    debug!(
        "Scanned {} bytes for {:?}: {} match(es)",
        scanner.bytes_scanned(),
        matcher.source(),
        spans.len()
    );
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{compile, SearchOptions};

    fn literal(find: &str) -> Matcher {
        compile(find, &SearchOptions::default()).unwrap()
    }

    fn regex(find: &str) -> Matcher {
        compile(find, &SearchOptions::default().regex(true)).unwrap()
    }

    fn starts(scanner: Scanner<'_, '_>) -> Vec<usize> {
        scanner.map(|r| r.unwrap().start).collect()
    }

    #[test]
    fn test_forward_without_wrap() {
        let m = literal("ab");
        let text = "ab ab ab";
        let scanner = Scanner::new(&m, text, 0..text.len(), 2, Direction::Forward, false).unwrap();
        assert_eq!(starts(scanner), vec![3, 6]);
    }

    #[test]
    fn test_forward_wraps_once() {
        let m = literal("ab");
        let text = "ab ab ab";
        let scanner = Scanner::new(&m, text, 0..text.len(), 2, Direction::Forward, true).unwrap();
        assert_eq!(starts(scanner), vec![3, 6, 0]);
    }

    #[test]
    fn test_backward_and_wrap() {
        let m = literal("ab");
        let text = "ab ab ab";
        let scanner = Scanner::new(&m, text, 0..text.len(), 4, Direction::Backward, false).unwrap();
        assert_eq!(starts(scanner), vec![3, 0]);

        let scanner = Scanner::new(&m, text, 0..text.len(), 4, Direction::Backward, true).unwrap();
        assert_eq!(starts(scanner), vec![3, 0, 6]);
    }

    #[test]
    fn test_backward_from_start_lands_on_last() {
        let m = literal("ab");
        let text = "ab ab ab";
        let mut scanner = Scanner::new(&m, text, 0..text.len(), 0, Direction::Backward, true).unwrap();
        assert_eq!(scanner.next().unwrap().unwrap().start, 6);
    }

    #[test]
    fn test_scope_limits_matches() {
        let m = literal("ab");
        let text = "ab ab ab";
        let spans = scan_all(&m, text, 2..6, &ScanBudget::unlimited()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].range(), 3..5);
    }

    #[test]
    fn test_scope_out_of_range() {
        let m = literal("ab");
        match scan_all(&m, "abc", 0..10, &ScanBudget::unlimited()) {
            Err(FinderError::ScopeOutOfRange { scope, buffer_len }) => {
                assert_eq!(scope, 0..10);
                assert_eq!(buffer_len, 3);
            }
            other => panic!("Expected ScopeOutOfRange, got {:?}", other),
        }
        assert!(scan_all(&m, "é", 0..1, &ScanBudget::unlimited()).is_err());
    }

    #[test]
    fn test_zero_width_terminates() {
        let m = regex("x*");
        let spans = scan_all(&m, "abc", 0..3, &ScanBudget::unlimited()).unwrap();
        let ranges: Vec<_> = spans.iter().map(|s| s.range()).collect();
        assert_eq!(ranges, vec![0..0, 1..1, 2..2, 3..3]);
    }

    #[test]
    fn test_zero_width_advances_by_code_point() {
        let m = regex("(?:)");
        let text = "aé😀";
        let spans = scan_all(&m, text, 0..text.len(), &ScanBudget::unlimited()).unwrap();
        let starts: Vec<_> = spans.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 1, 3, 7]);
    }

    #[test]
    fn test_empty_match_after_match_is_skipped() {
        let m = regex("a*");
        let spans = scan_all(&m, "aab", 0..3, &ScanBudget::unlimited()).unwrap();
        let ranges: Vec<_> = spans.iter().map(|s| s.range()).collect();
        assert_eq!(ranges, vec![0..2, 3..3]);
    }

    #[test]
    fn test_line_anchor_counts_lines() {
        let m = regex("^");
        let spans = scan_all(&m, "one\ntwo\nthree", 0..13, &ScanBudget::unlimited()).unwrap();
        let starts: Vec<_> = spans.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 4, 8]);
    }

    #[test]
    fn test_wrapped_zero_width_not_duplicated() {
        let m = regex("x*");
        let text = "ab";
        let scanner = Scanner::new(&m, text, 0..2, 1, Direction::Forward, true).unwrap();
        assert_eq!(starts(scanner), vec![1, 2, 0]);
    }

    #[test]
    fn test_resume_after_skips_adjacent_empty() {
        let m = regex("x*");
        let text = "ab";
        let scanner = Scanner::new(&m, text, 0..2, 1, Direction::Forward, false)
            .unwrap()
            .resume_after(1);
        assert_eq!(starts(scanner), vec![2]);
    }

    #[test]
    fn test_cancellation() {
        let m = literal("a");
        let token = CancellationToken::new();
        token.cancel();
        let budget = ScanBudget::unlimited().with_cancel(token.clone());
        match scan_all(&m, "aaaa", 0..4, &budget) {
            Err(FinderError::Cancelled(CancelReason::Requested)) => {}
            other => panic!("Expected Cancelled, got {:?}", other),
        }

        token.reset();
        assert_eq!(scan_all(&m, "aaaa", 0..4, &budget).unwrap().len(), 4);
    }

    #[test]
    fn test_budget_exhausted() {
        let m = literal("z");
        let text = "a".repeat(100);
        let budget = ScanBudget::unlimited().with_max_scan_bytes(10);
        match scan_all(&m, &text, 0..100, &budget) {
            Err(FinderError::Cancelled(CancelReason::BudgetExhausted { limit })) => {
                assert_eq!(limit, 10)
            }
            other => panic!("Expected BudgetExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_scanner_fused_after_error() {
        let m = literal("a");
        let token = CancellationToken::new();
        token.cancel();
        let mut scanner = Scanner::new(&m, "aaa", 0..3, 0, Direction::Forward, true)
            .unwrap()
            .with_budget(ScanBudget::unlimited().with_cancel(token));
        assert!(scanner.next().unwrap().is_err());
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_offsets_are_absolute() {
        let m = literal("b");
        let spans = scan_all(&m, "abcabc", 3..6, &ScanBudget::unlimited()).unwrap();
        assert_eq!(spans[0].range(), 4..5);
    }

    #[test]
    fn test_whole_word_at_scope_edge() {
        let text = "concat cat";
        let options = SearchOptions::default().whole_word(true);
        for m in [
            compile("cat", &options).unwrap(),
            compile("cat", &options.clone().regex(true)).unwrap(),
        ] {
            let spans = scan_all(&m, text, 3..10, &ScanBudget::unlimited()).unwrap();
            let ranges: Vec<_> = spans.iter().map(|s| s.range()).collect();
            assert_eq!(ranges, vec![7..10]);

            let backward = Scanner::new(&m, text, 3..10, 10, Direction::Backward, true).unwrap();
            assert_eq!(starts(backward), vec![7]);
        }
    }

    #[test]
    fn test_line_anchors_at_scope_edge() {
        let text = "one\ntwo three";
        let spans = scan_all(&regex("^"), text, 2..text.len(), &ScanBudget::unlimited()).unwrap();
        let starts: Vec<_> = spans.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![4]);

        let spans = scan_all(&regex("o$"), text, 4..7, &ScanBudget::unlimited()).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn test_match_running_past_scope_is_dropped() {
        let m = literal("abc");
        let spans = scan_all(&m, "xxabc", 0..4, &ScanBudget::unlimited()).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn test_wrap_within_inner_scope() {
        let m = literal("ab");
        let text = "ab ab ab ab";
        let scanner = Scanner::new(&m, text, 3..8, 6, Direction::Forward, true).unwrap();
        assert_eq!(starts(scanner), vec![6, 3]);
    }
}
