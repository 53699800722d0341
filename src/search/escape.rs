//! Escape-sequence handling for find strings and replacement templates.
use crate::error::{FinderError, Result};

/// Reserved escape character of the find-string mini-syntax. In regex mode it
/// makes the following metacharacter literal; with escapes enabled in literal
/// mode it introduces a control-character token.
pub const ESCAPE_CHARACTER: char = '\\';

/// Find string after escape expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedQuery {
    pub text: String,
    /// The query ended with the end-of-input token and must match at the end
    /// of the scope.
    pub anchored_end: bool,
}

/// Expand `\n`, `\t`, `\r`, `\\` and a trailing `\z` in a literal find string.
pub fn expand_find_string(input: &str) -> Result<ExpandedQuery> {
    expand(input, true)
}

/// Expand `\n`, `\t`, `\r` and `\\` in a replacement template. `$` references
/// are left untouched.
pub fn expand_template(input: &str) -> Result<String> {
    expand(input, false).map(|expanded| expanded.text)
}

fn expand(input: &str, allow_end_anchor: bool) -> Result<ExpandedQuery> {
    let mut text = String::with_capacity(input.len());
    let mut anchored_end = false;
    let mut chars = input.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        if c != ESCAPE_CHARACTER {
            text.push(c);
            continue;
        }

        let Some((_, token)) = chars.next() else {
            return Err(FinderError::InvalidEscape {
                position,
                sequence: ESCAPE_CHARACTER.to_string(),
            });
        };

        match token {
            'n' => text.push('\n'),
            't' => text.push('\t'),
            'r' => text.push('\r'),
            ESCAPE_CHARACTER => text.push(ESCAPE_CHARACTER),
            'z' if allow_end_anchor && chars.peek().is_none() => anchored_end = true,
            other => {
                return Err(FinderError::InvalidEscape {
                    position,
                    sequence: format!("{ESCAPE_CHARACTER}{other}"),
                });
            }
        }
    }

    Ok(ExpandedQuery { text, anchored_end })
}

/// Build a regex-mode find string that matches `text` literally by putting the
/// escape character in front of every metacharacter.
pub fn quote_literal(text: &str) -> String {
    regex::escape(text)
}
