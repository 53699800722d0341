//! Replacement templates and replace operations
use crate::error::{FinderError, Result};
use crate::search::escape::expand_template;
use crate::search::matcher::{MatchSpan, Matcher, MatcherKind};
use crate::search::scanner::{scan_all, validate_scope, ScanBudget};
use log::{debug, info};
use serde::Serialize;
use std::ops::Range;

/// One edit against the original buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

/// Outcome of a replace operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceResult {
    /// Where each replacement sits in `new_text`, ascending.
    pub applied_spans: Vec<MatchSpan>,
    /// Edits in original-buffer coordinates, in application order (last match
    /// first), so each range is still valid when it is applied.
    pub edits: Vec<TextEdit>,
    pub new_text: String,
    pub replaced_count: usize,
}

impl ReplaceResult {
    fn unchanged(text: &str) -> Self {
        Self {
            new_text: text.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Group(usize),
}

/// Parsed replacement template.
///
/// `$n` / `${n}` insert group `n` (`$0` is the whole match), `$name` /
/// `${name}` insert a named group and `$$` is a literal dollar sign. A `$`
/// not followed by a reference is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceTemplate {
    source: String,
    parts: Vec<Part>,
}

impl ReplaceTemplate {
    /// Parse `template` and resolve its group references against `matcher`.
    pub fn compile(template: &str, matcher: &Matcher, escapes_enabled: bool) -> Result<Self> {
        let expanded = if escapes_enabled {
            expand_template(template)?
        } else {
            template.to_string()
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = expanded.as_str();

        while let Some(dollar) = rest.find('$') {
            literal.push_str(&rest[..dollar]);
            let after = &rest[dollar + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                literal.push('$');
                rest = tail;
                continue;
            }

            let Some((reference, name, consumed)) = parse_reference(after) else {
                literal.push('$');
                rest = after;
                continue;
            };

            let index = resolve(matcher, &reference, name)?;
            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(Part::Group(index));
            rest = &after[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the template has no group references.
    pub fn is_literal(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    /// Substitute `span`'s groups from `text`. Groups that did not take part
    /// in the match expand to nothing.
    pub fn expand(&self, text: &str, span: &MatchSpan) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Group(index) => {
                    if let Some(range) = span.group(*index) {
                        out.push_str(&text[range]);
                    }
                }
            }
        }
        out
    }
}

enum GroupName<'a> {
    Index(&'a str),
    Name(&'a str),
}

/// Parse the reference following a `$`. Returns the reference as written, the
/// group it names and the number of bytes consumed after the `$`.
fn parse_reference(after: &str) -> Option<(String, GroupName<'_>, usize)> {
    if let Some(braced) = after.strip_prefix('{') {
        let close = braced.find('}')?;
        let inner = &braced[..close];
        let reference = format!("${{{inner}}}");
        let name = if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
            GroupName::Index(inner)
        } else {
            GroupName::Name(inner)
        };
        return Some((reference, name, close + 2));
    }

    let digits = after.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        let inner = &after[..digits];
        return Some((format!("${inner}"), GroupName::Index(inner), digits));
    }

    let mut bytes = after.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
            let len = 1 + bytes
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                .count();
            let inner = &after[..len];
            Some((format!("${inner}"), GroupName::Name(inner), len))
        }
        _ => None,
    }
}

fn resolve(matcher: &Matcher, reference: &str, name: GroupName<'_>) -> Result<usize> {
    let invalid = |reason: String| FinderError::InvalidReplacementReference {
        reference: reference.to_string(),
        reason,
    };

    if matcher.kind() == MatcherKind::Literal {
        return Err(invalid("literal queries have no capture groups".to_string()));
    }

    match name {
        GroupName::Index(digits) => {
            let index: usize = digits
                .parse()
                .map_err(|_| invalid("group index is too large".to_string()))?;
            if index <= matcher.group_count() {
                Ok(index)
            } else {
                Err(invalid(format!(
                    "pattern has {} capture group(s)",
                    matcher.group_count()
                )))
            }
        }
        GroupName::Name(name) if name.is_empty() => Err(invalid("empty group name".to_string())),
        GroupName::Name(name) => matcher
            .group_index(name)
            .ok_or_else(|| invalid(format!("pattern has no group named '{name}'"))),
    }
}

/// Replace a single, previously found match.
pub fn replace_one(text: &str, span: &MatchSpan, template: &ReplaceTemplate) -> Result<ReplaceResult> {
    validate_scope(text, &span.range())?;

    let replacement = template.expand(text, span);
    let mut new_text = String::with_capacity(text.len() + replacement.len());
    new_text.push_str(&text[..span.start]);
    new_text.push_str(&replacement);
    new_text.push_str(&text[span.end..]);

    Ok(ReplaceResult {
        applied_spans: vec![MatchSpan::new(span.start, span.start + replacement.len())],
        edits: vec![TextEdit {
            range: span.range(),
            replacement,
        }],
        new_text,
        replaced_count: 1,
    })
}

/// Replace every match in `scope`.
///
/// All matches are found before anything is substituted; the substitutions are
/// then applied from the last match to the first.
pub fn replace_all(
    matcher: &Matcher,
    text: &str,
    scope: Range<usize>,
    template: &ReplaceTemplate,
    budget: &ScanBudget,
) -> Result<ReplaceResult> {
    let spans = drop_overlaps(scan_all(matcher, text, scope, budget)?);
    if spans.is_empty() {
        debug!("Nothing to replace for {:?}", matcher.source());
        return Ok(ReplaceResult::unchanged(text));
    }

    let replacements: Vec<String> = spans.iter().map(|s| template.expand(text, s)).collect();

    let mut applied_spans = Vec::with_capacity(spans.len());
    let (mut added, mut removed) = (0usize, 0usize);
    for (span, replacement) in spans.iter().zip(&replacements) {
        let start = span.start + added - removed;
        applied_spans.push(MatchSpan::new(start, start + replacement.len()));
        added += replacement.len();
        removed += span.len();
    }

    let mut pieces: Vec<&str> = Vec::with_capacity(spans.len() * 2 + 1);
    let mut edits = Vec::with_capacity(spans.len());
    let mut tail = text.len();
    for (span, replacement) in spans.iter().zip(&replacements).rev() {
        pieces.push(&text[span.end..tail]);
        pieces.push(replacement);
        edits.push(TextEdit {
            range: span.range(),
            replacement: replacement.clone(),
        });
        tail = span.start;
    }
    pieces.push(&text[..tail]);
    let new_text: String = pieces.into_iter().rev().collect();

    info!(
        "Replaced {} match(es) of {:?}: {} -> {} bytes",
        spans.len(),
        matcher.source(),
        text.len(),
        new_text.len()
    );

    Ok(ReplaceResult {
        replaced_count: spans.len(),
        applied_spans,
        edits,
        new_text,
    })
}

/// Keep the leftmost of any overlapping spans. Input must be sorted by start.
fn drop_overlaps(spans: Vec<MatchSpan>) -> Vec<MatchSpan> {
    let mut kept: Vec<MatchSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(last) = kept.last() {
            if span.start < last.end || (span.is_empty() && span.start == last.end && last.is_empty()) {
                debug!("Skipping overlapping match at {}..{}", span.start, span.end);
                continue;
            }
        }
        kept.push(span);
    }
    kept
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

    fn replace_everything(matcher: &Matcher, text: &str, template: &str) -> ReplaceResult {
        let template = ReplaceTemplate::compile(template, matcher, false).unwrap();
        replace_all(matcher, text, 0..text.len(), &template, &ScanBudget::unlimited()).unwrap()
    }

    #[test]
    fn test_replace_all_right_to_left() {
        let m = literal("a");
        let result = replace_everything(&m, "aXaXa", "bb");
        assert_eq!(result.new_text, "bbXbbXbb");
        assert_eq!(result.replaced_count, 3);

        let ranges: Vec<_> = result.edits.iter().map(|e| e.range.clone()).collect();
        assert_eq!(ranges, vec![4..5, 2..3, 0..1]);

        let applied: Vec<_> = result.applied_spans.iter().map(|s| s.range()).collect();
        assert_eq!(applied, vec![0..2, 3..5, 6..8]);
    }

    #[test]
    fn test_edits_apply_in_order() {
        let m = literal("cat");
        let text = "cat scat cat";
        let result = replace_everything(&m, text, "dog");

        let mut buffer = text.to_string();
        for edit in &result.edits {
            buffer.replace_range(edit.range.clone(), &edit.replacement);
        }
        assert_eq!(buffer, result.new_text);
        assert_eq!(buffer, "dog sdog dog");
    }

    #[test]
    fn test_no_matches_is_not_an_error() {
        let m = literal("zzz");
        let result = replace_everything(&m, "abc", "x");
        assert_eq!(result.replaced_count, 0);
        assert_eq!(result.new_text, "abc");
        assert!(result.edits.is_empty());
    }

    #[test]
    fn test_group_references() {
        let m = regex(r"(\w+)=(?P<value>\d+)");
        let result = replace_everything(&m, "a=1, bc=22", "${value}:$1 $$");
        assert_eq!(result.new_text, "1:a $, 22:bc $");
    }

    #[test]
    fn test_whole_match_reference() {
        let m = regex(r"\d+");
        let result = replace_everything(&m, "x 12 y 3", "[$0]");
        assert_eq!(result.new_text, "x [12] y [3]");
    }

    #[test]
    fn test_digits_then_letters_is_index() {
        let m = regex(r"(a)");
        let result = replace_everything(&m, "a", "$1b");
        assert_eq!(result.new_text, "ab");
    }

    #[test]
    fn test_non_participating_group_expands_empty() {
        let m = regex(r"(x)?y");
        let result = replace_everything(&m, "y xy", "<$1>");
        assert_eq!(result.new_text, "<> <x>");
    }

    #[test]
    fn test_bare_dollar_is_literal() {
        let m = regex("a");
        let result = replace_everything(&m, "a", "$ 5");
        assert_eq!(result.new_text, "$ 5");

        let m = literal("a");
        let result = replace_everything(&m, "a", "costs $");
        assert_eq!(result.new_text, "costs $");
    }

    #[test]
    fn test_invalid_references() {
        let m = regex(r"(a)");
        for template in ["$2", "${2}", "$name", "${name}", "${}"] {
            match ReplaceTemplate::compile(template, &m, false) {
                Err(FinderError::InvalidReplacementReference { .. }) => {}
                other => panic!("Expected InvalidReplacementReference for {template}, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_literal_matcher_rejects_references() {
        let m = literal("a");
        match ReplaceTemplate::compile("$1", &m, false) {
            Err(FinderError::InvalidReplacementReference { reference, .. }) => {
                assert_eq!(reference, "$1")
            }
            other => panic!("Expected InvalidReplacementReference, got {:?}", other),
        }
        assert!(ReplaceTemplate::compile("$$1", &m, false).is_ok());
    }

    #[test]
    fn test_template_escapes() {
        let m = literal(",");
        let template = ReplaceTemplate::compile(r",\n", &m, true).unwrap();
        let result = replace_all(&m, "a,b", 0..3, &template, &ScanBudget::unlimited()).unwrap();
        assert_eq!(result.new_text, "a,\nb");

        assert!(ReplaceTemplate::compile(r"\q", &m, true).is_err());
        let verbatim = ReplaceTemplate::compile(r"\n", &m, false).unwrap();
        assert!(verbatim.is_literal());
        assert_eq!(verbatim.expand("a,b", &MatchSpan::new(1, 2)), r"\n");
    }

    #[test]
    fn test_zero_width_replace_all() {
        let m = regex("^");
        let result = replace_everything(&m, "a\nb", "> ");
        assert_eq!(result.new_text, "> a\n> b");
        assert_eq!(result.replaced_count, 2);
    }

    #[test]
    fn test_replace_within_scope() {
        let m = literal("a");
        let template = ReplaceTemplate::compile("-", &m, false).unwrap();
        let result = replace_all(&m, "aaaa", 1..3, &template, &ScanBudget::unlimited()).unwrap();
        assert_eq!(result.new_text, "a--a");
    }

    #[test]
    fn test_scoped_whole_word_leaves_partial_word() {
        let options = SearchOptions::default().whole_word(true);
        let m = compile("cat", &options).unwrap();
        let template = ReplaceTemplate::compile("dog", &m, false).unwrap();
        let result = replace_all(&m, "concat cat", 3..10, &template, &ScanBudget::unlimited()).unwrap();
        assert_eq!(result.new_text, "concat dog");
        assert_eq!(result.replaced_count, 1);
    }

    #[test]
    fn test_replace_one_reports_new_span() {
        let m = regex(r"(\d+)");
        let text = "id 7 end";
        let span = m.find_at(text, 0).unwrap();
        let template = ReplaceTemplate::compile("#$1#", &m, false).unwrap();
        let result = replace_one(text, &span, &template).unwrap();
        assert_eq!(result.new_text, "id #7# end");
        assert_eq!(result.applied_spans[0].range(), 3..6);
        assert_eq!(result.replaced_count, 1);
    }

    #[test]
    fn test_replace_one_rejects_stale_span() {
        let m = literal("a");
        let template = ReplaceTemplate::compile("b", &m, false).unwrap();
        assert!(matches!(
            replace_one("ab", &MatchSpan::new(1, 5), &template),
            Err(FinderError::ScopeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_drop_overlaps_keeps_leftmost() {
        let spans = vec![MatchSpan::new(0, 3), MatchSpan::new(2, 4), MatchSpan::new(4, 5)];
        let kept: Vec<_> = drop_overlaps(spans).iter().map(|s| s.range()).collect();
        assert_eq!(kept, vec![0..3, 4..5]);
    }
}
