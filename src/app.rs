//! Command handlers for the textfinder binary
use crate::cli::{Cli, Commands, QueryArgs};
use crate::client::{StringBuffer, TextClient};
use crate::clipboard::ClipboardManager;
use crate::config::Config;
use crate::error::{FinderError, Result};
use crate::finder::TextFinder;
use crate::metrics::Metrics;
use crate::output::{OutputFormat, OutputFormatter};
use crate::search::{CancellationToken, MultipleReplacement, SearchScope};
use colored::Colorize;
use log::{debug, info};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Runs one command over one file.
pub struct FinderApp {
    config: Config,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    color: bool,
}

impl FinderApp {
    pub fn new(config: Config, metrics: Arc<Metrics>, cancel: CancellationToken) -> Self {
        let color = config.display.color;
        Self {
            config,
            metrics,
            cancel,
            color,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run the command. Returns whether anything matched.
    pub fn run(&self, cli: &Cli) -> Result<bool> {
        match &cli.command {
            Commands::Find {
                pattern,
                file,
                query,
                all,
                backward,
                from,
                format,
                copy,
            } => self.handle_find(pattern, file, query, *all, *backward, *from, *format, *copy),
            Commands::Count {
                pattern,
                file,
                query,
            } => self.handle_count(pattern, file, query),
            Commands::Replace {
                pattern,
                replacement,
                file,
                query,
                in_place,
                dry_run,
                format,
            } => self.handle_replace(
                pattern,
                replacement,
                file,
                query,
                *in_place,
                *dry_run,
                *format,
            ),
            Commands::Batch {
                rules,
                file,
                scope,
                in_place,
                format,
            } => self.handle_batch(rules, file, scope.clone(), *in_place, *format),
            Commands::Completions { shell } => self.handle_completions(*shell),
        }
    }

    fn finder(&self, buffer: StringBuffer) -> TextFinder<StringBuffer> {
        TextFinder::new(buffer, &self.config)
            .with_cancellation_token(self.cancel.clone())
            .with_metrics(Arc::clone(&self.metrics))
    }

    fn formatter(&self, format: OutputFormat) -> OutputFormatter {
        OutputFormatter::new(format).with_color(self.color)
    }

    fn load(&self, file: &Path) -> Result<StringBuffer> {
        let text = fs::read_to_string(file).map_err(|e| {
            FinderError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {e}", file.display()),
            ))
        })?;
        debug!("Loaded {} ({} bytes)", file.display(), text.len());
        Ok(StringBuffer::new(text))
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_find(
        &self,
        pattern: &str,
        file: &Path,
        query: &QueryArgs,
        all: bool,
        backward: bool,
        from: Option<usize>,
        format: OutputFormat,
        copy: bool,
    ) -> Result<bool> {
        let mut buffer = self.load(file)?;
        if let Some(from) = from {
            buffer.set_selection(from..from);
        }

        let mut finder = self.finder(buffer);
        finder.set_query(pattern, "", query.apply(self.config.search.to_options()))?;

        let spans = if all {
            finder.find_all()?
        } else {
            let outcome = if backward {
                finder.find_previous()?
            } else {
                finder.find_next()?
            };
            outcome.span().cloned().into_iter().collect()
        };
        let buffer = finder.into_provider();

        if spans.is_empty() {
            if format == OutputFormat::Json {
                println!(
                    "{}",
                    self.formatter(format)
                        .format_matches(buffer.as_str(), &spans, pattern, file)
                );
            }
            eprintln!("{}", "No matches found".yellow());
            return Ok(false);
        }

        let output = self
            .formatter(format)
            .format_matches(buffer.as_str(), &spans, pattern, file);
        match format {
            OutputFormat::Text => print!("{output}"),
            OutputFormat::Json => println!("{output}"),
        }

        if all && self.config.display.show_summary && format == OutputFormat::Text {
            eprintln!(
                "{} {} match(es) in {}",
                "Found".green(),
                spans.len(),
                file.display()
            );
        }

        if copy {
            let copied: Vec<&str> = spans.iter().map(|s| s.as_str(buffer.as_str())).collect();
            ClipboardManager::new()?.copy_to_clipboard(&copied.join("\n"))?;
            info!("Copied {} match(es) to the clipboard", copied.len());
        }

        Ok(true)
    }

    fn handle_count(&self, pattern: &str, file: &Path, query: &QueryArgs) -> Result<bool> {
        let mut finder = self.finder(self.load(file)?);
        finder.set_query(pattern, "", query.apply(self.config.search.to_options()))?;
        let count = finder.match_count()?;
        println!("{count}");
        Ok(count > 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_replace(
        &self,
        pattern: &str,
        replacement: &str,
        file: &Path,
        query: &QueryArgs,
        in_place: bool,
        dry_run: bool,
        format: OutputFormat,
    ) -> Result<bool> {
        let mut finder = self.finder(self.load(file)?);
        finder.set_query(
            pattern,
            replacement,
            query.apply(self.config.search.to_options()),
        )?;

        if dry_run {
            let spans = finder.find_all()?;
            let buffer = finder.into_provider();
            print!(
                "{}",
                self.formatter(format)
                    .format_matches(buffer.as_str(), &spans, pattern, file)
            );
            eprintln!("Would replace {} match(es) in {}", spans.len(), file.display());
            return Ok(true);
        }

        let result = finder.replace_all()?;
        let buffer = finder.into_provider();

        if in_place {
            if result.replaced_count > 0 {
                fs::write(file, buffer.as_str())?;
                info!("Wrote {} bytes to {}", buffer.as_str().len(), file.display());
            }
            println!("{}", self.formatter(format).format_replace(&result, pattern, file));
        } else {
            print!("{}", buffer.as_str());
            if self.config.display.show_summary {
                eprintln!(
                    "{}",
                    self.formatter(OutputFormat::Text)
                        .format_replace(&result, pattern, file)
                );
            }
        }

        Ok(true)
    }

    fn handle_batch(
        &self,
        rules: &Path,
        file: &Path,
        scope: Option<SearchScope>,
        in_place: bool,
        format: OutputFormat,
    ) -> Result<bool> {
        let batch = MultipleReplacement::load_from(rules)?;
        debug!("Loaded {} rule(s) from {}", batch.rules.len(), rules.display());

        let mut finder = self.finder(self.load(file)?);
        let result = finder.apply_replacements(&batch, scope.unwrap_or_default())?;
        let buffer = finder.into_provider();

        if in_place {
            if result.replaced_count > 0 {
                fs::write(file, buffer.as_str())?;
                info!("Wrote {} bytes to {}", buffer.as_str().len(), file.display());
            }
            println!("{}", self.formatter(format).format_batch(&result, &batch, file));
        } else {
            print!("{}", buffer.as_str());
            if self.config.display.show_summary {
                eprintln!(
                    "{}",
                    self.formatter(OutputFormat::Text)
                        .format_batch(&result, &batch, file)
                );
            }
        }

        Ok(true)
    }

    fn handle_completions(&self, shell: clap_complete::Shell) -> Result<bool> {
        use clap::CommandFactory;
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "textfinder", &mut std::io::stdout());
        Ok(true)
    }
}
