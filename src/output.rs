//! Rendering of matches and replace results for the command line
use crate::search::{BatchResult, MatchSpan, MultipleReplacement, ReplaceResult};
use clap::ValueEnum;
use colored::*;
use serde_json::{json, Value};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Byte offset to line/column lookup.
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(memchr::memchr_iter(b'\n', text.as_bytes()).map(|i| i + 1));
        Self { starts }
    }

    /// 1-based line and column (in characters) of `offset`.
    pub fn locate(&self, text: &str, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&s| s <= offset).max(1);
        let start = self.starts[line - 1];
        let column = text.get(start..offset).map_or(0, |s| s.chars().count()) + 1;
        (line, column)
    }

    /// Byte range of 1-based `line`, without its line terminator.
    pub fn line_range(&self, text: &str, line: usize) -> std::ops::Range<usize> {
        let start = self.starts[line - 1];
        let mut end = self.starts.get(line).map_or(text.len(), |&next| next - 1);
        if end > start && text.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        start..end
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
    color: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            color: true,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn format_matches(&self, text: &str, spans: &[MatchSpan], query: &str, path: &Path) -> String {
        match self.format {
            OutputFormat::Text => self.format_text(text, spans),
            OutputFormat::Json => self.format_json(text, spans, query, path),
        }
    }

    fn format_text(&self, text: &str, spans: &[MatchSpan]) -> String {
        let index = LineIndex::new(text);
        let mut out = String::new();

        for span in spans {
            let (line, column) = index.locate(text, span.start);
            let line_range = index.line_range(text, line);
            // A match may start on the line terminator itself.
            let match_start = span.start.min(line_range.end);
            let match_end = span.end.clamp(match_start, line_range.end);

            let before = &text[line_range.start..match_start];
            let matched = &text[match_start..match_end];
            let after = &text[match_end..line_range.end];
            let position = format!("{line}:{column}");

            if self.color {
                out.push_str(&format!(
                    "→ {} │ {}{}{}\n",
                    position.yellow().bold(),
                    before,
                    matched.yellow().bold(),
                    after
                ));
            } else {
                out.push_str(&format!("→ {position} │ {before}{matched}{after}\n"));
            }
        }
        out
    }

    fn format_json(&self, text: &str, spans: &[MatchSpan], query: &str, path: &Path) -> String {
        let index = LineIndex::new(text);
        let matches: Vec<Value> = spans
            .iter()
            .map(|span| {
                let (line, column) = index.locate(text, span.start);
                let groups: Vec<Value> = span
                    .groups
                    .iter()
                    .map(|g| {
                        json!({
                            "index": g.index,
                            "name": g.name,
                            "text": g.range.clone().map(|r| &text[r]),
                        })
                    })
                    .collect();
                json!({
                    "start": span.start,
                    "end": span.end,
                    "line_number": line,
                    "column": column,
                    "matched_text": span.as_str(text),
                    "groups": groups,
                })
            })
            .collect();

        let result = json!({
            "query": query,
            "path": path.to_string_lossy(),
            "total_matches": spans.len(),
            "matches": matches,
        });
        format!("{result:#}")
    }

    pub fn format_batch(&self, result: &BatchResult, batch: &MultipleReplacement, path: &Path) -> String {
        match self.format {
            OutputFormat::Text => {
                let count = result.replaced_count.to_string();
                let count = if self.color {
                    count.green().bold().to_string()
                } else {
                    count
                };
                format!(
                    "Replaced {count} match(es) with {} rule(s) in {}",
                    batch.rules.len(),
                    path.display()
                )
            }
            OutputFormat::Json => {
                let rules: Vec<Value> = batch
                    .rules
                    .iter()
                    .zip(&result.per_rule)
                    .map(|(rule, count)| {
                        json!({
                            "find": rule.find,
                            "replacement": rule.replacement,
                            "enabled": rule.enabled,
                            "replaced_count": count,
                        })
                    })
                    .collect();
                let result = json!({
                    "path": path.to_string_lossy(),
                    "replaced_count": result.replaced_count,
                    "rules": rules,
                });
                format!("{result:#}")
            }
        }
    }

    pub fn format_replace(&self, result: &ReplaceResult, query: &str, path: &Path) -> String {
        match self.format {
            OutputFormat::Text => {
                let count = result.replaced_count.to_string();
                let count = if self.color {
                    count.green().bold().to_string()
                } else {
                    count
                };
                format!("Replaced {count} match(es) in {}", path.display())
            }
            OutputFormat::Json => {
                let result = json!({
                    "query": query,
                    "path": path.to_string_lossy(),
                    "replaced_count": result.replaced_count,
                    "edits": result.edits,
                });
                format!("{result:#}")
            }
        }
    }
}
