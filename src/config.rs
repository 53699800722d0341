use crate::search::SearchOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

/// Default search flags, overridden by command-line switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub regex: bool,
    pub wrap_around: bool,
    pub escapes_enabled: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let options = SearchOptions::default();
        Self {
            case_sensitive: options.case_sensitive,
            whole_word: options.whole_word,
            regex: options.regex,
            wrap_around: options.wrap_around,
            escapes_enabled: options.escapes_enabled,
        }
    }
}

impl SearchConfig {
    pub fn to_options(&self) -> SearchOptions {
        SearchOptions::default()
            .case_sensitive(self.case_sensitive)
            .whole_word(self.whole_word)
            .regex(self.regex)
            .wrap_around(self.wrap_around)
            .escapes(self.escapes_enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_regex_cache_size")]
    pub regex_cache_size: usize,
    /// Upper bound on bytes a single operation may scan. Unlimited when unset.
    #[serde(default)]
    pub max_scan_bytes: Option<usize>,
}

fn default_regex_cache_size() -> usize {
    100
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            regex_cache_size: default_regex_cache_size(),
            max_scan_bytes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub show_summary: bool,
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_summary: true,
            color: true,
        }
    }
}

impl Config {
    /// Load from `explicit` when given, otherwise from the first config file
    /// found, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_path(),
        };
        match config_path {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Some(xdg_config) = dirs::config_dir() {
            let xdg_path = xdg_config.join("textfinder/config.toml");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let home_path = home.join(".textfinder.toml");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        let current_path = Path::new(".textfinder.toml");
        if current_path.exists() {
            return Some(current_path.to_path_buf());
        }

        None
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_search_options() {
        let config = Config::default();
        assert_eq!(config.search.to_options(), SearchOptions::default());
        assert_eq!(config.performance.regex_cache_size, 100);
        assert!(config.performance.max_scan_bytes.is_none());
        assert!(config.display.show_summary);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [search]
            regex = true

            [performance]
            max_scan_bytes = 4096
            "#,
        )
        .unwrap();
        assert!(config.search.regex);
        assert!(config.search.wrap_around);
        assert_eq!(config.performance.regex_cache_size, 100);
        assert_eq!(config.performance.max_scan_bytes, Some(4096));
        assert!(config.display.color);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.search.case_sensitive = true;
        config.display.color = false;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
