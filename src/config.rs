use crate::tree::TreeParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid mask rule `{pattern}`: {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the miner needs at startup.
///
/// Loaded from TOML; missing keys fall back to the defaults below.
///
/// ```toml
/// [drain]
/// similarity_threshold = 0.4
/// match_depth = 4
///
/// [masking]
/// use_defaults = false
///
/// [[masking.rules]]
/// regex_pattern = '\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b'
/// mask_with = "IP"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub drain: DrainConfig,
    pub masking: MaskingConfig,
    pub snapshot: SnapshotConfig,
    pub profiling: ProfilingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    pub similarity_threshold: f64,
    pub match_depth: usize,
    pub max_children: usize,
    pub parametrize_numeric_tokens: bool,
    /// Strings treated like whitespace when tokenizing, e.g. `"_"` or `"="`.
    pub extra_delimiters: Vec<String>,
}

impl Default for DrainConfig {
    fn default() -> Self {
        let tree = TreeParams::default();
        Self {
            similarity_threshold: 0.4,
            match_depth: tree.match_depth,
            max_children: tree.max_children,
            parametrize_numeric_tokens: tree.parametrize_numeric_tokens,
            extra_delimiters: Vec::new(),
        }
    }
}

impl DrainConfig {
    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            match_depth: self.match_depth,
            max_children: self.max_children,
            parametrize_numeric_tokens: self.parametrize_numeric_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskRuleConfig {
    pub regex_pattern: String,
    pub mask_with: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    pub prefix: String,
    pub suffix: String,
    /// Apply the built-in rule set before `rules`.
    pub use_defaults: bool,
    pub rules: Vec<MaskRuleConfig>,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            prefix: "<".into(),
            suffix: ">".into(),
            use_defaults: false,
            rules: Vec::new(),
        }
    }
}

impl MaskingConfig {
    /// Rendering of a wildcard template position, `<*>` by default.
    pub fn wildcard_marker(&self) -> String {
        format!("{}*{}", self.prefix, self.suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Save after every line that created or loosened a cluster.
    pub on_change: bool,
    /// Save at least this often while lines keep arriving. 0 disables.
    pub interval_minutes: u64,
    pub compress_state: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { on_change: true, interval_minutes: 5, compress_state: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub enabled: bool,
    /// Log the profiler report this often. 0 disables.
    pub report_interval_secs: u64,
}

impl MinerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path.display(), rules = config.masking.rules.len(), "loaded miner config");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Structural sanity checks. Mask rule regexes are compiled (and checked)
    /// when the masker is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.drain;
        if d.match_depth == 0 {
            return Err(ConfigError::Invalid("drain.match_depth must be > 0".into()));
        }
        if d.max_children == 0 {
            return Err(ConfigError::Invalid("drain.max_children must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&d.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "drain.similarity_threshold must be within [0, 1], got {}",
                d.similarity_threshold
            )));
        }
        if d.extra_delimiters.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::Invalid("drain.extra_delimiters must not contain empty strings".into()));
        }
        let m = &self.masking;
        if m.prefix.is_empty() && m.suffix.is_empty() {
            return Err(ConfigError::Invalid("masking.prefix and masking.suffix cannot both be empty".into()));
        }
        for rule in &m.rules {
            if rule.mask_with.is_empty() || rule.mask_with.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "mask rule `{}` needs a non-empty mask_with label without whitespace",
                    rule.regex_pattern
                )));
            }
            if rule.regex_pattern.is_empty() {
                return Err(ConfigError::Invalid(format!("mask rule `{}` has an empty pattern", rule.mask_with)));
            }
        }
        Ok(())
    }
}
