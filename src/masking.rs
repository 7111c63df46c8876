use crate::config::{ConfigError, MaskingConfig};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use std::borrow::Cow;

static RE_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    // 2025-08-07T06:41:18Z, 2025-08-07 06:41:18.123456+01:00, 2024-12-09 14:30:45.999-0800,
    // 2024-01-01 12:00:00 (zone optional)
    Regex::new(r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?(?:Z|[+-](?:\d{2}(?::?\d{2})?))?\b").unwrap()
});

static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b[a-zA-Z][a-zA-Z0-9+.-]*://[^\s"']+\b"#).unwrap()
});

static RE_IPV6: Lazy<Regex> = Lazy::new(|| {
    // Full form only, no `::` shorthand
    Regex::new(r"\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b").unwrap()
});

static RE_IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b").unwrap()
});

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static RE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b").unwrap()
});

static RE_PATH: Lazy<Regex> = Lazy::new(|| {
    // Absolute and common relative paths; at least two components for absolute ones
    Regex::new(r"(?x)
        (?:
            /[\w.\-]+(?:/[\w.\-]+)+
          | \./[\w.\-]+(?:/[\w.\-]+)*
          | \.\./[\w.\-]+(?:/[\w.\-]+)*
          | ~/[\w.\-]+(?:/[\w.\-]+)*
        )
    ").unwrap()
});

static RE_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:0x)?[0-9a-fA-F]{16,}\b").unwrap()
});

static RE_FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b-?\d+\.\d+\b").unwrap()
});

static RE_INT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b-?\d+\b").unwrap()
});

/// One compiled rule: every match of `pattern` becomes `replacement`.
#[derive(Debug, Clone)]
pub struct MaskingRule {
    pattern: Regex,
    label: String,
    replacement: String,
}

impl MaskingRule {
    pub fn new(pattern: Regex, label: &str, prefix: &str, suffix: &str) -> Self {
        Self {
            pattern,
            label: label.to_string(),
            replacement: format!("{prefix}{label}{suffix}"),
        }
    }

    pub fn compile(pattern: &str, label: &str, prefix: &str, suffix: &str) -> Result<Self, ConfigError> {
        let re = Regex::new(pattern).map_err(|source| ConfigError::InvalidRule {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self::new(re, label, prefix, suffix))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

/// Built-in rules, in application order. Order matters: timestamps, URLs and
/// addresses go before the bare number rules that would split them.
pub fn default_rules(prefix: &str, suffix: &str) -> Vec<MaskingRule> {
    [
        (&*RE_TIMESTAMP, "TIMESTAMP"),
        (&*RE_URL, "URL"),
        (&*RE_IPV6, "IP"),
        (&*RE_IPV4, "IP"),
        (&*RE_EMAIL, "EMAIL"),
        (&*RE_UUID, "UUID"),
        (&*RE_PATH, "PATH"),
        (&*RE_HEX, "HEX"),
        (&*RE_FLOAT, "NUM"),
        (&*RE_INT, "NUM"),
    ]
    .into_iter()
    .map(|(re, label)| MaskingRule::new(re.clone(), label, prefix, suffix))
    .collect()
}

/// Applies `rules` in order, each over the whole line. Replacement text is
/// literal, `$` in a label is never expanded.
pub fn mask<'a>(line: &'a str, rules: &[MaskingRule]) -> Cow<'a, str> {
    let mut out = Cow::Borrowed(line);
    for rule in rules {
        let replaced = match rule.pattern.replace_all(&out, NoExpand(&rule.replacement)) {
            Cow::Owned(s) => Some(s),
            Cow::Borrowed(_) => None,
        };
        if let Some(s) = replaced {
            out = Cow::Owned(s);
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct Masker {
    rules: Vec<MaskingRule>,
    prefix: String,
    suffix: String,
}

impl Masker {
    pub fn from_config(config: &MaskingConfig) -> Result<Self, ConfigError> {
        let mut rules = if config.use_defaults {
            default_rules(&config.prefix, &config.suffix)
        } else {
            Vec::new()
        };
        for rule in &config.rules {
            rules.push(MaskingRule::compile(&rule.regex_pattern, &rule.mask_with, &config.prefix, &config.suffix)?);
        }
        Ok(Self { rules, prefix: config.prefix.clone(), suffix: config.suffix.clone() })
    }

    pub fn with_default_rules() -> Self {
        let config = MaskingConfig { use_defaults: true, ..MaskingConfig::default() };
        Self {
            rules: default_rules(&config.prefix, &config.suffix),
            prefix: config.prefix,
            suffix: config.suffix,
        }
    }

    pub fn rules(&self) -> &[MaskingRule] {
        &self.rules
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn mask<'a>(&self, line: &'a str) -> Cow<'a, str> {
        mask(line, &self.rules)
    }

    /// Patterns of every rule that masks to `label`, in rule order.
    pub fn patterns_for_label<'s>(&'s self, label: &'s str) -> impl Iterator<Item = &'s Regex> + 's {
        self.rules.iter().filter(move |r| r.label == label).map(|r| &r.pattern)
    }
}
