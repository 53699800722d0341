//! Ordered sets of find/replace rules applied as one operation
use crate::error::Result;
use crate::search::replace::replace_all;
use crate::search::scanner::{validate_scope, ScanBudget};
use crate::search::{MatcherCache, ReplaceTemplate, SearchOptions};
use anyhow::Context;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::Path;

fn default_true() -> bool {
    true
}

/// One find/replace pair with its own matching flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRule {
    pub find: String,

    #[serde(default)]
    pub replacement: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub regex: bool,

    #[serde(default)]
    pub case_sensitive: bool,

    #[serde(default)]
    pub whole_word: bool,

    #[serde(default)]
    pub escapes_enabled: bool,
}

impl ReplacementRule {
    pub fn new(find: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replacement: replacement.into(),
            description: None,
            enabled: true,
            regex: false,
            case_sensitive: false,
            whole_word: false,
            escapes_enabled: false,
        }
    }

    pub fn regex(mut self, value: bool) -> Self {
        self.regex = value;
        self
    }

    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.case_sensitive = value;
        self
    }

    pub fn whole_word(mut self, value: bool) -> Self {
        self.whole_word = value;
        self
    }

    pub fn enabled(mut self, value: bool) -> Self {
        self.enabled = value;
        self
    }

    pub fn options(&self) -> SearchOptions {
        SearchOptions::default()
            .regex(self.regex)
            .case_sensitive(self.case_sensitive)
            .whole_word(self.whole_word)
            .escapes(self.escapes_enabled)
    }

    fn is_active(&self) -> bool {
        self.enabled && !self.find.is_empty()
    }
}

/// Outcome of running a [`MultipleReplacement`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub new_text: String,
    /// Where the scope ends in `new_text`.
    pub scope_end: usize,
    /// Replacements made by each rule, in rule order. Skipped rules count 0.
    pub per_rule: Vec<usize>,
    pub replaced_count: usize,
}

/// An ordered list of replacement rules, stored as TOML:
///
/// ```toml
/// [[rule]]
/// find = "colour"
/// replacement = "color"
///
/// [[rule]]
/// find = '(\d+)px'
/// replacement = "${1}rem"
/// regex = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleReplacement {
    #[serde(default, rename = "rule")]
    pub rules: Vec<ReplacementRule>,
}

impl MultipleReplacement {
    pub fn new(rules: Vec<ReplacementRule>) -> Self {
        Self { rules }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replacement rules: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse replacement rules: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize replacement rules")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create rules directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write replacement rules: {}", path.display()))?;

        Ok(())
    }

    /// Run every enabled rule over `scope`, each one on the output of the
    /// previous. All rules are compiled before any text is touched; a
    /// failure anywhere returns the error and no text.
    pub fn apply(
        &self,
        text: &str,
        scope: Range<usize>,
        cache: &MatcherCache,
        budget: &ScanBudget,
    ) -> Result<BatchResult> {
        validate_scope(text, &scope)?;

        let mut compiled = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !rule.is_active() {
                compiled.push(None);
                continue;
            }
            let options = rule.options();
            let matcher = cache.get_or_compile(&rule.find, &options)?;
            let template = ReplaceTemplate::compile(&rule.replacement, &matcher, options.escapes_enabled)?;
            compiled.push(Some((matcher, template)));
        }

        let mut working = text.to_string();
        let mut scope = scope;
        let mut per_rule = Vec::with_capacity(compiled.len());
        for (i, entry) in compiled.iter().enumerate() {
            let Some((matcher, template)) = entry else {
                debug!("Skipping rule {i}");
                per_rule.push(0);
                continue;
            };

            let result = replace_all(matcher, &working, scope.clone(), template, budget)?;
            if result.replaced_count > 0 {
                scope.end = scope.end + result.new_text.len() - working.len();
                working = result.new_text;
            }
            per_rule.push(result.replaced_count);
        }

        let replaced_count = per_rule.iter().sum();
        info!(
            "Applied {} rule(s) with {} replacement(s)",
            per_rule.len(),
            replaced_count
        );
        Ok(BatchResult {
            new_text: working,
            scope_end: scope.end,
            per_rule,
            replaced_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CancelReason, FinderError};
    use crate::search::CancellationToken;
    use tempfile::tempdir;

    fn run(batch: &MultipleReplacement, text: &str) -> Result<BatchResult> {
        batch.apply(text, 0..text.len(), &MatcherCache::new(8), &ScanBudget::unlimited())
    }

    #[test]
    fn test_rules_apply_in_order() {
        let batch = MultipleReplacement::new(vec![
            ReplacementRule::new("cat", "dog"),
            ReplacementRule::new("dog", "wolf"),
        ]);
        let result = run(&batch, "cat and dog").unwrap();
        assert_eq!(result.new_text, "wolf and wolf");
        assert_eq!(result.per_rule, vec![1, 2]);
        assert_eq!(result.replaced_count, 3);
    }

    #[test]
    fn test_disabled_and_empty_rules_are_skipped() {
        let batch = MultipleReplacement::new(vec![
            ReplacementRule::new("a", "b").enabled(false),
            ReplacementRule::new("", "x"),
            ReplacementRule::new(r"(\d)", "<$1>").regex(true),
        ]);
        let result = run(&batch, "a1").unwrap();
        assert_eq!(result.new_text, "a<1>");
        assert_eq!(result.per_rule, vec![0, 0, 1]);
    }

    #[test]
    fn test_invalid_rule_fails_before_any_replacement() {
        let batch = MultipleReplacement::new(vec![
            ReplacementRule::new("a", "b"),
            ReplacementRule::new("(", "x").regex(true),
        ]);
        assert!(matches!(run(&batch, "aaa"), Err(FinderError::InvalidPattern(_))));
    }

    #[test]
    fn test_scope_follows_length_changes() {
        let batch = MultipleReplacement::new(vec![
            ReplacementRule::new("a", "aaa"),
            ReplacementRule::new("b", "-"),
        ]);
        let text = "ab|ab";
        let result = batch
            .apply(text, 0..2, &MatcherCache::new(8), &ScanBudget::unlimited())
            .unwrap();
        assert_eq!(result.new_text, "aaa-|ab");
        assert_eq!(result.scope_end, 4);
    }

    #[test]
    fn test_cancelled_batch_returns_error() {
        let token = CancellationToken::new();
        token.cancel();
        let batch = MultipleReplacement::new(vec![ReplacementRule::new("a", "b")]);
        let budget = ScanBudget::unlimited().with_cancel(token);
        match batch.apply("aaa", 0..3, &MatcherCache::new(8), &budget) {
            Err(FinderError::Cancelled(CancelReason::Requested)) => {}
            other => panic!("Expected Cancelled, got {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load_rules() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules/units.toml");

        let batch = MultipleReplacement::new(vec![
            ReplacementRule::new(r"(\d+)px", "${1}rem").regex(true),
            ReplacementRule::new("colour", "color").whole_word(true),
        ]);
        batch.save(&path).unwrap();
        assert_eq!(MultipleReplacement::load_from(&path).unwrap(), batch);
    }

    #[test]
    fn test_rule_file_defaults() {
        let batch: MultipleReplacement = toml::from_str(
            r#"
            [[rule]]
            find = "teh"
            replacement = "the"
            "#,
        )
        .unwrap();
        let rule = &batch.rules[0];
        assert!(rule.enabled);
        assert!(!rule.regex);
        assert_eq!(rule.options(), SearchOptions::default());
    }
}
