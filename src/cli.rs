use crate::output::OutputFormat;
use crate::search::{SearchOptions, SearchScope};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Find and replace text in a file", long_about = None)]
pub struct Cli {
    #[clap(long, global = true, value_parser, default_value_t = false)]
    pub verbose: bool,

    /// Write log output to this file instead of stderr
    #[clap(long, global = true, value_parser)]
    pub log: Option<PathBuf>,

    /// Configuration file to use instead of the default lookup
    #[clap(long, global = true, value_parser)]
    pub config: Option<PathBuf>,

    /// Print collected metrics to stderr on exit
    #[clap(long, global = true, value_parser, default_value_t = false)]
    pub metrics: bool,

    #[clap(long, global = true, value_parser, default_value_t = false)]
    pub no_color: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Flags shared by every search command.
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Treat the pattern as a regular expression
    #[clap(long, value_parser, default_value_t = false)]
    pub regex: bool,

    #[clap(short = 's', long, value_parser, default_value_t = false)]
    pub case_sensitive: bool,

    #[clap(short = 'w', long, value_parser, default_value_t = false)]
    pub whole_word: bool,

    #[clap(long, value_parser, default_value_t = false)]
    pub no_wrap: bool,

    /// Interpret \n, \t, \r, \\ and a trailing \z in the pattern
    #[clap(long, value_parser, default_value_t = false)]
    pub escapes: bool,

    /// Restrict the search to a byte range, e.g. 10..200
    #[clap(long, value_parser = parse_scope)]
    pub scope: Option<SearchScope>,
}

impl QueryArgs {
    /// Layer these flags over configured defaults. A flag can only switch a
    /// default on (or wrap-around off).
    pub fn apply(&self, base: SearchOptions) -> SearchOptions {
        let mut options = base;
        options.regex |= self.regex;
        options.case_sensitive |= self.case_sensitive;
        options.whole_word |= self.whole_word;
        options.escapes_enabled |= self.escapes;
        if self.no_wrap {
            options.wrap_around = false;
        }
        if let Some(scope) = &self.scope {
            options.scope = scope.clone();
        }
        options
    }
}

pub fn parse_scope(value: &str) -> Result<SearchScope, String> {
    let (start, end) = value
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got '{value}'"))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid scope start '{start}': {e}"))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid scope end '{end}': {e}"))?;
    if end < start {
        return Err(format!("scope end {end} is before start {start}"));
    }
    Ok(SearchScope::range(start..end))
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find the next match, or every match with --all
    Find {
        pattern: String,

        file: PathBuf,

        #[clap(flatten)]
        query: QueryArgs,

        #[clap(long, value_parser, default_value_t = false)]
        all: bool,

        #[clap(long, value_parser, default_value_t = false)]
        backward: bool,

        /// Byte offset to search from
        #[clap(long, value_parser)]
        from: Option<usize>,

        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Copy the matched text to the clipboard
        #[clap(long, value_parser, default_value_t = false)]
        copy: bool,
    },
    /// Print the number of matches
    Count {
        pattern: String,

        file: PathBuf,

        #[clap(flatten)]
        query: QueryArgs,
    },
    /// Replace every match
    Replace {
        pattern: String,

        /// Replacement template; $1, ${name} and $$ are expanded for regex patterns
        replacement: String,

        file: PathBuf,

        #[clap(flatten)]
        query: QueryArgs,

        /// Write the result back to FILE instead of stdout
        #[clap(long, value_parser, default_value_t = false)]
        in_place: bool,

        /// Report what would be replaced without writing anything
        #[clap(long, value_parser, default_value_t = false)]
        dry_run: bool,

        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Apply a file of replacement rules, in order, as one edit
    Batch {
        /// TOML file with [[rule]] entries
        rules: PathBuf,

        file: PathBuf,

        /// Restrict the rules to a byte range, e.g. 10..200
        #[clap(long, value_parser = parse_scope)]
        scope: Option<SearchScope>,

        /// Write the result back to FILE instead of stdout
        #[clap(long, value_parser, default_value_t = false)]
        in_place: bool,

        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate shell completions
    Completions {
        #[clap(value_enum)]
        shell: clap_complete::Shell,
    },
}
