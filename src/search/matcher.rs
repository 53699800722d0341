//! Compiled query representation
use crate::error::{FinderError, Result};
use crate::search::escape::expand_find_string;
use crate::search::SearchOptions;
use log::debug;
use memchr::memmem;
use regex::{Regex, RegexBuilder};
use regex_syntax::ParserBuilder;
use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// A sub-match captured by a regex group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedGroup {
    pub index: usize,
    pub name: Option<String>,
    /// `None` when the group did not participate in the match.
    pub range: Option<Range<usize>>,
}

/// One match, as a half-open byte range into the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<CapturedGroup>,
}

impl MatchSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            groups: Vec::new(),
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Same position, ignoring captures.
    pub fn same_range(&self, other: &MatchSpan) -> bool {
        self.start == other.start && self.end == other.end
    }

    pub fn group(&self, index: usize) -> Option<Range<usize>> {
        if index == 0 {
            return Some(self.range());
        }
        self.groups
            .iter()
            .find(|g| g.index == index)
            .and_then(|g| g.range.clone())
    }

    pub fn named(&self, name: &str) -> Option<Range<usize>> {
        self.groups
            .iter()
            .find(|g| g.name.as_deref() == Some(name))
            .and_then(|g| g.range.clone())
    }

    pub fn as_str<'t>(&self, text: &'t str) -> &'t str {
        &text[self.range()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    Literal,
    Regex,
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherKind::Literal => write!(f, "literal"),
            MatcherKind::Regex => write!(f, "regex"),
        }
    }
}

enum Engine {
    Literal(LiteralEngine),
    Regex(Regex),
}

struct LiteralEngine {
    needle: String,
    /// Case-sensitive byte search.
    finder: Option<memmem::Finder<'static>>,
    /// Case-folding search over the escaped needle.
    folded: Option<Regex>,
    whole_word: bool,
    anchored_end: bool,
}

/// Immutable, reusable compiled query.
pub struct Matcher {
    source: String,
    kind: MatcherKind,
    engine: Engine,
    group_names: Vec<Option<String>>,
    zero_width: bool,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("source", &self.source)
            .field("kind", &self.kind)
            .field("groups", &self.group_names.len())
            .field("zero_width", &self.zero_width)
            .finish()
    }
}

/// Compile a find string into a matcher.
pub fn compile(find: &str, options: &SearchOptions) -> Result<Matcher> {
    if find.is_empty() {
        return Err(FinderError::EmptyQuery);
    }

    let matcher = if options.regex {
        Matcher::regex(find, options)?
    } else {
        Matcher::literal(find, options)?
    };

    debug!(
        "Compiled {} matcher for {:?} (case_sensitive={}, whole_word={}, zero_width={})",
        matcher.kind,
        find,
        options.case_sensitive,
        options.whole_word,
        matcher.zero_width
    );
    Ok(matcher)
}

impl Matcher {
    fn literal(find: &str, options: &SearchOptions) -> Result<Self> {
        let (needle, anchored_end) = if options.escapes_enabled {
            let expanded = expand_find_string(find)?;
            (expanded.text, expanded.anchored_end)
        } else {
            (find.to_string(), false)
        };

        if needle.is_empty() {
            return Err(FinderError::EmptyQuery);
        }

        let (finder, folded) = if options.case_sensitive {
            (Some(memmem::Finder::new(needle.as_bytes()).into_owned()), None)
        } else {
            let mut pattern = regex::escape(&needle);
            if anchored_end {
                pattern.push_str(r"\z");
            }
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(FinderError::from)?;
            (None, Some(regex))
        };

        Ok(Self {
            source: find.to_string(),
            kind: MatcherKind::Literal,
            engine: Engine::Literal(LiteralEngine {
                needle,
                finder,
                folded,
                whole_word: options.whole_word,
                anchored_end,
            }),
            group_names: Vec::new(),
            zero_width: false,
        })
    }

    fn regex(find: &str, options: &SearchOptions) -> Result<Self> {
        // Validate the user's pattern on its own so error positions refer to
        // what they typed, not to the whole-word wrapper.
        RegexBuilder::new(find).build().map_err(FinderError::from)?;

        let pattern = if options.whole_word {
            format!(r"\b(?:{find})\b")
        } else {
            find.to_string()
        };

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!options.case_sensitive)
            .multi_line(true)
            .crlf(true)
            .build()
            .map_err(FinderError::from)?;

        let group_names = regex
            .capture_names()
            .skip(1)
            .map(|name| name.map(str::to_string))
            .collect();
        let zero_width = ParserBuilder::new()
            .case_insensitive(!options.case_sensitive)
            .multi_line(true)
            .crlf(true)
            .build()
            .parse(&pattern)
            .is_ok_and(|hir| hir.properties().minimum_len() == Some(0));

        Ok(Self {
            source: find.to_string(),
            kind: MatcherKind::Regex,
            engine: Engine::Regex(regex),
            group_names,
            zero_width,
        })
    }

    /// The find string exactly as it was given to [`compile`].
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> MatcherKind {
        self.kind
    }

    /// Whether the pattern can produce empty matches.
    pub fn is_zero_width(&self) -> bool {
        self.zero_width
    }

    /// Number of capture groups, not counting the implicit whole-match group.
    pub fn group_count(&self) -> usize {
        self.group_names.len()
    }

    /// Index of a named group.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.group_names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .map(|i| i + 1)
    }

    /// Leftmost match in `hay` starting at or after `at`.
    ///
    /// `at` must lie on a char boundary.
    pub fn find_at(&self, hay: &str, at: usize) -> Option<MatchSpan> {
        self.find_in(hay, at..hay.len())
    }

    /// Leftmost match starting at or after `range.start` that lies wholly
    /// inside `range`.
    ///
    /// Word boundaries and line anchors are judged against all of `text`, so a
    /// range edge inside a word or line is not mistaken for a boundary. Both
    /// ends of `range` must lie on char boundaries.
    pub fn find_in(&self, text: &str, range: Range<usize>) -> Option<MatchSpan> {
        if range.start > range.end || range.end > text.len() {
            return None;
        }
        match &self.engine {
            Engine::Literal(literal) => literal.find_in(text, range),
            Engine::Regex(regex) => self.regex_find_in(regex, text, range),
        }
    }

    fn regex_find_in(&self, regex: &Regex, text: &str, range: Range<usize>) -> Option<MatchSpan> {
        let mut pos = range.start;
        loop {
            let span = self.regex_find_at(regex, text, pos)?;
            if span.end <= range.end {
                return Some(span);
            }
            // Runs past the range end; later candidates may still fit.
            if span.start >= range.end {
                return None;
            }
            pos = next_char_boundary(text, span.start);
        }
    }

    fn regex_find_at(&self, regex: &Regex, text: &str, at: usize) -> Option<MatchSpan> {
        if self.group_names.is_empty() {
            return regex
                .find_at(text, at)
                .map(|m| MatchSpan::new(m.start(), m.end()));
        }

        let caps = regex.captures_at(text, at)?;
        let whole = caps.get(0)?;
        let groups = self
            .group_names
            .iter()
            .enumerate()
            .map(|(i, name)| CapturedGroup {
                index: i + 1,
                name: name.clone(),
                range: caps.get(i + 1).map(|m| m.range()),
            })
            .collect();

        Some(MatchSpan {
            start: whole.start(),
            end: whole.end(),
            groups,
        })
    }
}

impl LiteralEngine {
    fn find_in(&self, text: &str, range: Range<usize>) -> Option<MatchSpan> {
        let mut pos = range.start;
        loop {
            let (start, end) = self.candidate(text, pos, range.end)?;
            if !self.whole_word || is_word_bounded(text, start, end) {
                return Some(MatchSpan::new(start, end));
            }
            if self.anchored_end || start >= range.end {
                return None;
            }
            pos = next_char_boundary(text, start);
        }
    }

    /// Next occurrence of the needle in `text[pos..limit]`. A needle anchored
    /// with `\z` only matches at the end of the buffer.
    fn candidate(&self, text: &str, pos: usize, limit: usize) -> Option<(usize, usize)> {
        if self.anchored_end {
            if limit < text.len() {
                return None;
            }
            if let Some(regex) = &self.folded {
                return regex.find_at(text, pos).map(|m| (m.start(), m.end()));
            }
            let start = text.len().checked_sub(self.needle.len())?;
            return (start >= pos && text.ends_with(self.needle.as_str()))
                .then_some((start, text.len()));
        }

        let window = &text[..limit];
        if let Some(regex) = &self.folded {
            return regex.find_at(window, pos).map(|m| (m.start(), m.end()));
        }

        let finder = self.finder.as_ref()?;
        finder
            .find(&window.as_bytes()[pos..])
            .map(|i| (pos + i, pos + i + self.needle.len()))
    }
}

/// Word characters for whole-word matching, Unicode-aware.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back().is_some_and(is_word_char);
    let after = text[end..].chars().next().is_some_and(is_word_char);
    !before && !after
}

/// Offset of the char boundary following `pos`, or `text.len()` at the end.
pub(crate) fn next_char_boundary(text: &str, pos: usize) -> usize {
    text[pos..]
        .chars()
        .next()
        .map_or(text.len(), |c| pos + c.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(find: &str) -> Matcher {
        compile(find, &SearchOptions::default()).unwrap()
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(matches!(
            compile("", &SearchOptions::default()),
            Err(FinderError::EmptyQuery)
        ));
        assert!(matches!(
            compile("", &SearchOptions::default().regex(true)),
            Err(FinderError::EmptyQuery)
        ));
    }

    #[test]
    fn test_case_insensitive_literal() {
        let matcher = literal("Find");
        let span = matcher.find_at("i will find it", 0).unwrap();
        assert_eq!(span.range(), 7..11);
    }

    #[test]
    fn test_case_sensitive_literal() {
        let options = SearchOptions::default().case_sensitive(true);
        let matcher = compile("Find", &options).unwrap();
        assert!(matcher.find_at("i will find it", 0).is_none());
        assert_eq!(matcher.find_at("Find find Find", 1).unwrap().start, 10);
    }

    #[test]
    fn test_literal_metacharacters() {
        let matcher = literal("foo.*bar");
        assert!(matcher.find_at("fooXXXbar", 0).is_none());
        assert_eq!(matcher.find_at("x foo.*bar", 0).unwrap().range(), 2..10);
    }

    #[test]
    fn test_whole_word_literal() {
        let options = SearchOptions::default().whole_word(true);
        let matcher = compile("cat", &options).unwrap();
        let span = matcher.find_at("concatenate cat", 0).unwrap();
        assert_eq!(span.range(), 12..15);
    }

    #[test]
    fn test_whole_word_is_unicode_aware() {
        let options = SearchOptions::default().whole_word(true);
        let matcher = compile("caf", &options).unwrap();
        assert!(matcher.find_at("café", 0).is_none());

        let matcher = compile("über", &options).unwrap();
        assert_eq!(matcher.find_at("Xüber über", 0).unwrap().start, 7);
    }

    #[test]
    fn test_case_folding_across_byte_lengths() {
        let matcher = literal("STRASSE");
        assert!(matcher.find_at("die strasse", 0).is_some());

        let matcher = literal("ÉTÉ");
        assert_eq!(matcher.find_at("un été", 0).unwrap().start, 3);
    }

    #[test]
    fn test_escaped_literal_and_end_anchor() {
        let options = SearchOptions::default().escapes(true).case_sensitive(true);
        let matcher = compile(r"a\tb", &options).unwrap();
        assert_eq!(matcher.source(), r"a\tb");
        assert_eq!(matcher.find_at("xa\tb", 0).unwrap().range(), 1..4);

        let matcher = compile(r"end\z", &options).unwrap();
        assert_eq!(matcher.find_at("end of the end", 0).unwrap().range(), 11..14);
        assert!(matcher.find_at("end of the end.", 0).is_none());
    }

    #[test]
    fn test_escape_errors_surface() {
        let options = SearchOptions::default().escapes(true);
        assert!(matches!(
            compile(r"bad\q", &options),
            Err(FinderError::InvalidEscape { .. })
        ));
    }

    #[test]
    fn test_invalid_regex() {
        let options = SearchOptions::default().regex(true);
        match compile("(abc", &options) {
            Err(FinderError::InvalidPattern(message)) => assert!(!message.is_empty()),
            other => panic!("Expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn test_regex_groups() {
        let options = SearchOptions::default().regex(true);
        let matcher = compile(r"(?P<key>\w+)=(\d+)", &options).unwrap();
        assert_eq!(matcher.group_count(), 2);
        assert_eq!(matcher.group_index("key"), Some(1));

        let span = matcher.find_at("x: width=42", 0).unwrap();
        assert_eq!(span.range(), 3..11);
        assert_eq!(span.named("key"), Some(3..8));
        assert_eq!(span.group(2), Some(9..11));
    }

    #[test]
    fn test_zero_width_flag() {
        let options = SearchOptions::default().regex(true);
        assert!(compile("^", &options).unwrap().is_zero_width());
        assert!(compile("x*", &options).unwrap().is_zero_width());
        assert!(compile(r"\b", &options).unwrap().is_zero_width());
        assert!(compile("a|", &options).unwrap().is_zero_width());
        assert!(!compile("x+", &options).unwrap().is_zero_width());
        assert!(!literal("x").is_zero_width());
    }

    #[test]
    fn test_whole_word_regex() {
        let options = SearchOptions::default().regex(true).whole_word(true);
        let matcher = compile("ca.", &options).unwrap();
        assert_eq!(matcher.find_at("concatenate cat", 0).unwrap().start, 12);
    }

    #[test]
    fn test_escape_character_round_trip() {
        let options = SearchOptions::default().regex(true);
        let matcher = compile(r"1\+1", &options).unwrap();
        assert_eq!(matcher.source(), r"1\+1");
        assert_eq!(matcher.find_at("11 1+1", 0).unwrap().range(), 3..6);
    }

    #[test]
    fn test_find_in_sees_context_outside_range() {
        let text = "concat cat";
        let options = SearchOptions::default().whole_word(true);
        let literal = compile("cat", &options).unwrap();
        let regex = compile("cat", &options.clone().regex(true)).unwrap();
        for matcher in [&literal, &regex] {
            assert_eq!(matcher.find_in(text, 3..10).unwrap().range(), 7..10);
            assert!(matcher.find_in(text, 3..6).is_none());
        }
    }

    #[test]
    fn test_find_in_skips_match_running_past_range() {
        let options = SearchOptions::default().regex(true);
        let matcher = compile("a.c|b", &options).unwrap();
        assert_eq!(matcher.find_in("abc", 0..2).unwrap().range(), 1..2);
        assert!(compile("ab", &options).unwrap().find_in("xab", 0..2).is_none());

        let matcher = literal("ab");
        assert!(matcher.find_in("ab", 0..1).is_none());
    }

    #[test]
    fn test_anchored_literal_needs_buffer_end() {
        let options = SearchOptions::default().escapes(true);
        let matcher = compile(r"end\z", &options).unwrap();
        assert_eq!(matcher.find_in("the end", 0..7).unwrap().range(), 4..7);
        assert!(matcher.find_in("the end.", 0..7).is_none());
    }
}
