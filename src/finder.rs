//! Find/replace facade driven by a UI or command layer
use crate::client::{ClientProvider, TextClient};
use crate::config::Config;
use crate::error::{FinderError, Result};
use crate::metrics::Metrics;
use crate::search::{
    self, quote_literal, replace_one, BatchResult, CancellationToken, Direction, FindOutcome,
    MatchSpan, MatcherCache, MultipleReplacement, ReplaceResult, ReplaceTemplate, ScanBudget,
    SearchOptions, SearchScope, SearchSession, SessionPhase, ESCAPE_CHARACTER,
};
use log::{debug, info};
use std::ops::Range;
use std::sync::Arc;

struct ActiveQuery {
    find: String,
    replacement: String,
    template: ReplaceTemplate,
    session: SearchSession,
}

/// Text finder bound to a client provider.
///
/// One query and one session at a time. Every operation resolves the focused
/// buffer afresh; switching to a different buffer ends the session.
pub struct TextFinder<P: ClientProvider> {
    provider: P,
    cache: Arc<MatcherCache>,
    query: Option<ActiveQuery>,
    cancel: CancellationToken,
    max_scan_bytes: Option<usize>,
    metrics: Option<Arc<Metrics>>,
}

fn focused<P: ClientProvider>(provider: &mut P) -> Result<&mut dyn TextClient> {
    provider.focused_buffer().ok_or(FinderError::NoFocusedBuffer)
}

fn sync(session: &mut SearchSession, client: &dyn TextClient) {
    let id = client.buffer_id();
    if session.buffer_id().is_some_and(|current| current != id) {
        debug!("Focused buffer changed to {id:?}; ending session");
        session.close();
    }
    session.sync(id, client.version());
}

fn observe<T>(metrics: Option<&Metrics>, result: Result<T>) -> Result<T> {
    if let (Some(metrics), Err(FinderError::Cancelled(_))) = (metrics, &result) {
        metrics.scans_cancelled.inc();
    }
    result
}

impl<P: ClientProvider> TextFinder<P> {
    pub fn new(provider: P, config: &Config) -> Self {
        Self {
            provider,
            cache: Arc::new(MatcherCache::new(config.performance.regex_cache_size)),
            query: None,
            cancel: CancellationToken::new(),
            max_scan_bytes: config.performance.max_scan_bytes,
            metrics: None,
        }
    }

    /// Share a matcher cache with other finders.
    pub fn with_cache(mut self, cache: Arc<MatcherCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use an externally owned token, e.g. one set from a signal handler.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Token checked by every scan. Once cancelled, operations fail with
    /// `Cancelled` until the token is reset.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn budget(&self) -> ScanBudget {
        let budget = ScanBudget::unlimited().with_cancel(self.cancel.clone());
        match self.max_scan_bytes {
            Some(limit) => budget.with_max_scan_bytes(limit),
            None => budget,
        }
    }

    /// Compile `find` and `replacement` under `options`. Errors surface here,
    /// before anything is scanned, and leave the previous query in place.
    pub fn set_query(&mut self, find: &str, replacement: &str, options: SearchOptions) -> Result<()> {
        let matcher = self.cache.get_or_compile(find, &options)?;
        let template = ReplaceTemplate::compile(replacement, &matcher, options.escapes_enabled)?;

        match self.query.take() {
            Some(mut active)
                if Arc::ptr_eq(active.session.matcher(), &matcher)
                    && active.session.options() == &options =>
            {
                active.find = find.to_string();
                active.replacement = replacement.to_string();
                active.template = template;
                self.query = Some(active);
            }
            _ => {
                debug!("New {} query {find:?}", matcher.kind());
                self.query = Some(ActiveQuery {
                    find: find.to_string(),
                    replacement: replacement.to_string(),
                    template,
                    session: SearchSession::new(matcher, options),
                });
            }
        }
        Ok(())
    }

    pub fn find_string(&self) -> Option<&str> {
        self.query.as_ref().map(|q| q.find.as_str())
    }

    pub fn replacement_string(&self) -> Option<&str> {
        self.query.as_ref().map(|q| q.replacement.as_str())
    }

    pub fn phase(&self) -> SessionPhase {
        self.query
            .as_ref()
            .map_or(SessionPhase::Idle, |q| q.session.phase())
    }

    pub fn current_match(&self) -> Option<&MatchSpan> {
        self.query.as_ref()?.session.current_match()
    }

    /// Select the next match after the selection.
    pub fn find_next(&mut self) -> Result<FindOutcome> {
        self.step(Direction::Forward)
    }

    /// Select the previous match before the selection.
    pub fn find_previous(&mut self) -> Result<FindOutcome> {
        self.step(Direction::Backward)
    }

    fn step(&mut self, direction: Direction) -> Result<FindOutcome> {
        let budget = self.budget();
        let query = self.query.as_mut().ok_or(FinderError::NoQuery)?;
        let client = focused(&mut self.provider)?;
        sync(&mut query.session, &*client);

        let result = {
            let text = client.text();
            query
                .session
                .find(&text, client.selection(), direction, &budget)
        };
        let outcome = observe(self.metrics.as_deref(), result)?;

        if let Some(metrics) = &self.metrics {
            metrics.searches_run.inc();
            if outcome.is_found() {
                metrics.matches_found.inc();
            }
        }
        if let FindOutcome::Found(span) = &outcome {
            client.set_selection(span.range());
        }
        Ok(outcome)
    }

    /// Every match in scope, ascending.
    pub fn find_all(&mut self) -> Result<Vec<MatchSpan>> {
        let budget = self.budget();
        let query = self.query.as_mut().ok_or(FinderError::NoQuery)?;
        let client = focused(&mut self.provider)?;
        sync(&mut query.session, &*client);

        let result = {
            let text = client.text();
            query
                .session
                .find_all(&text, &budget)
                .map(<[MatchSpan]>::to_vec)
        };
        let spans = observe(self.metrics.as_deref(), result)?;

        if let Some(metrics) = &self.metrics {
            metrics.searches_run.inc();
            metrics.matches_found.inc_by(spans.len() as u64);
        }
        Ok(spans)
    }

    pub fn match_count(&mut self) -> Result<usize> {
        let budget = self.budget();
        let query = self.query.as_mut().ok_or(FinderError::NoQuery)?;
        let client = focused(&mut self.provider)?;
        sync(&mut query.session, &*client);

        let result = {
            let text = client.text();
            query.session.count_all(&text, &budget)
        };
        observe(self.metrics.as_deref(), result)
    }

    /// Position of the current match among all matches. Counts the matches
    /// first when they are not known yet.
    pub fn current_match_index(&mut self) -> Result<Option<usize>> {
        let budget = self.budget();
        let query = self.query.as_mut().ok_or(FinderError::NoQuery)?;
        let client = focused(&mut self.provider)?;
        sync(&mut query.session, &*client);

        if query.session.current_match().is_some() && query.session.total_match_count().is_none() {
            let result = {
                let text = client.text();
                query.session.count_all(&text, &budget)
            };
            observe(self.metrics.as_deref(), result)?;
        }
        Ok(query.session.current_match_index())
    }

    /// Replace the current match if it is still selected. Returns the range
    /// the replacement occupies, or `None` when nothing was replaced.
    pub fn replace(&mut self) -> Result<Option<Range<usize>>> {
        let query = self.query.as_mut().ok_or(FinderError::NoQuery)?;
        let client = focused(&mut self.provider)?;
        sync(&mut query.session, &*client);

        let selection = client.selection();
        let Some(current) = query
            .session
            .current_match()
            .filter(|c| c.range() == selection)
            .cloned()
        else {
            debug!("Selection is not the current match; nothing to replace");
            return Ok(None);
        };

        let result = {
            let text = client.text();
            replace_one(&text, &current, &query.template)?
        };
        let Some(edit) = result.edits.into_iter().next() else {
            return Ok(None);
        };

        let applied = client.apply_edit(edit.range, &edit.replacement);
        query.session.record_edit(client.version());
        client.set_selection(applied.clone());

        if let Some(metrics) = &self.metrics {
            metrics.replacements_applied.inc();
        }
        Ok(Some(applied))
    }

    /// Replace the current match, if selected, then move to the next one.
    pub fn replace_current_and_find_next(&mut self) -> Result<FindOutcome> {
        self.replace()?;
        self.find_next()
    }

    /// Replace every match in scope.
    ///
    /// All edits are computed before the buffer is touched; a cancelled or
    /// failed scan leaves it unchanged.
    pub fn replace_all(&mut self) -> Result<ReplaceResult> {
        let budget = self.budget();
        let query = self.query.as_mut().ok_or(FinderError::NoQuery)?;
        let client = focused(&mut self.provider)?;
        sync(&mut query.session, &*client);

        let result = {
            let text = client.text();
            let scope = query.session.options().scope.resolve(text.len());
            search::replace_all(query.session.matcher(), &text, scope, &query.template, &budget)
        };
        let result = observe(self.metrics.as_deref(), result)?;
        if result.replaced_count == 0 {
            return Ok(result);
        }

        for edit in &result.edits {
            client.apply_edit(edit.range.clone(), &edit.replacement);
        }
        query.session.record_edit(client.version());
        if let Some(first) = result.applied_spans.first() {
            client.set_selection(first.start..first.start);
        }

        info!(
            "Applied {} replacement(s) to buffer {:?}",
            result.replaced_count,
            client.buffer_id()
        );
        if let Some(metrics) = &self.metrics {
            metrics.replacements_applied.inc_by(result.replaced_count as u64);
        }
        Ok(result)
    }

    /// Run a rule set over `scope` of the focused buffer as one edit.
    ///
    /// Works without a query. The buffer is untouched unless every rule
    /// compiles and every scan completes.
    pub fn apply_replacements(
        &mut self,
        batch: &MultipleReplacement,
        scope: SearchScope,
    ) -> Result<BatchResult> {
        let budget = self.budget();
        let client = focused(&mut self.provider)?;

        let (result, scope) = {
            let text = client.text();
            let scope = scope.resolve(text.len());
            (batch.apply(&text, scope.clone(), &self.cache, &budget), scope)
        };
        let result = observe(self.metrics.as_deref(), result)?;
        if result.replaced_count == 0 {
            return Ok(result);
        }

        let applied = client.apply_edit(scope.clone(), &result.new_text[scope.start..result.scope_end]);
        client.set_selection(applied.start..applied.start);

        info!(
            "Applied {} replacement(s) from {} rule(s) to buffer {:?}",
            result.replaced_count,
            batch.rules.len(),
            client.buffer_id()
        );
        if let Some(metrics) = &self.metrics {
            metrics.replacements_applied.inc_by(result.replaced_count as u64);
        }
        Ok(result)
    }

    /// Text currently selected in the focused buffer.
    pub fn selected_string(&mut self) -> Result<String> {
        let client = focused(&mut self.provider)?;
        let text = client.text();
        let selected = text.get(client.selection()).unwrap_or_default().to_string();
        Ok(selected)
    }

    /// Make the selected text the find string, quoted so it matches itself
    /// under the current options. Returns the new find string; an empty
    /// selection leaves the query as it is.
    pub fn use_selection_for_find(&mut self) -> Result<String> {
        let selected = self.selected_string()?;
        if selected.is_empty() {
            debug!("Nothing selected; keeping the find string");
            return Ok(self.find_string().unwrap_or_default().to_string());
        }
        let (replacement, options) = match &self.query {
            Some(q) => (q.replacement.clone(), q.session.options().clone()),
            None => (String::new(), SearchOptions::default()),
        };

        let find = if options.regex {
            quote_literal(&selected)
        } else if options.escapes_enabled {
            selected.replace(ESCAPE_CHARACTER, "\\\\")
        } else {
            selected
        };
        self.set_query(&find, &replacement, options)?;
        Ok(find)
    }

    /// Close the session. The query is kept; the next find starts afresh.
    pub fn end_session(&mut self) {
        if let Some(query) = self.query.as_mut() {
            query.session.close();
        }
    }
}
