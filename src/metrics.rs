use crate::error::{FinderError, Result};
use log::warn;
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub searches_run: IntCounter,
    pub matches_found: IntCounter,
    pub replacements_applied: IntCounter,
    pub scans_cancelled: IntCounter,
    registry: Arc<Registry>,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .map_err(|e| FinderError::Other(format!("Failed to create metric {name}: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| FinderError::Other(format!("Failed to register metric {name}: {e}")))?;
    Ok(counter)
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let searches_run = counter(&registry, "searches_run", "Number of find operations run")?;
        let matches_found = counter(&registry, "matches_found", "Number of matches found")?;
        let replacements_applied = counter(
            &registry,
            "replacements_applied",
            "Number of replacements applied to buffers",
        )?;
        let scans_cancelled = counter(
            &registry,
            "scans_cancelled",
            "Number of scans stopped by cancellation or budget",
        )?;

        Ok(Metrics {
            searches_run,
            matches_found,
            replacements_applied,
            scans_cancelled,
            registry: Arc::new(registry),
        })
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!("Failed to encode metrics: {e}");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_lists_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.matches_found.inc_by(3);
        let text = metrics.gather();
        assert!(text.contains("matches_found 3"));
        assert!(text.contains("searches_run 0"));
        assert!(text.contains("scans_cancelled"));
    }
}
