use crate::cluster::{Cluster, ClusterStore};
use crate::config::{ConfigError, MinerConfig};
use crate::drain::{ChangeType, Drain, DrainParams, MiningResult, SearchStrategy};
use crate::masking::Masker;
use crate::persistence::{self, PersistenceError, PersistenceHandler, SnapshotError};
use crate::profiler::Profiler;
use crate::tokenizer::Tokenizer;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use lru::LruCache;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use thiserror::Error;

const PATTERN_CACHE_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// What `load_state` found.
#[derive(Debug)]
pub enum LoadOutcome {
    /// No persistence handler is attached.
    NoPersistence,
    /// Nothing saved yet; mining starts cold.
    Empty,
    Restored { clusters: usize, saved_at: DateTime<Utc> },
    /// The snapshot failed its integrity checks. State was reset to empty.
    Corrupt(SnapshotError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedParameter {
    pub value: String,
    /// Mask label the value stood behind, `*` for a plain wildcard.
    pub mask_name: String,
}

/// The pure part of the pipeline: masking then tokenizing. Cheap to clone and
/// safe to share across threads.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    masker: Masker,
    tokenizer: Tokenizer,
}

impl Preprocessor {
    pub fn new(masker: Masker, tokenizer: Tokenizer) -> Self {
        Self { masker, tokenizer }
    }

    pub fn masker(&self) -> &Masker {
        &self.masker
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn mask<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.masker.mask(line)
    }

    pub fn tokenize(&self, masked: &str) -> Vec<String> {
        self.tokenizer.tokenize(masked)
    }

    pub fn prepare(&self, line: &str) -> Vec<String> {
        self.tokenize(&self.mask(line))
    }
}

#[derive(Debug, Clone)]
struct TemplatePattern {
    regex: Regex,
    names: Vec<String>,
}

/// Incremental template miner: one raw line in, one [`MiningResult`] out.
pub struct TemplateMiner {
    config: MinerConfig,
    marker: String,
    pre: Preprocessor,
    drain: Drain,
    profiler: Profiler,
    persistence: Option<Box<dyn PersistenceHandler>>,
    last_save: Instant,
    patterns: LruCache<String, Option<TemplatePattern>>,
}

impl TemplateMiner {
    pub fn new(config: MinerConfig) -> Result<Self, MinerError> {
        let profiler = if config.profiling.enabled { Profiler::enabled() } else { Profiler::disabled() };
        Self::with_profiler(config, profiler)
    }

    /// Validates `config` and compiles the mask rules. Any failure here is fatal.
    pub fn with_profiler(config: MinerConfig, profiler: Profiler) -> Result<Self, MinerError> {
        config.validate()?;
        let masker = Masker::from_config(&config.masking)?;
        let tokenizer = Tokenizer::new(config.drain.extra_delimiters.clone());
        let drain = Drain::new(drain_params(&config));
        Ok(Self {
            marker: config.masking.wildcard_marker(),
            config,
            pre: Preprocessor::new(masker, tokenizer),
            drain,
            profiler,
            persistence: None,
            last_save: Instant::now(),
            patterns: LruCache::new(NonZeroUsize::new(PATTERN_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
        })
    }

    pub fn with_persistence(mut self, handler: impl PersistenceHandler + 'static) -> Self {
        self.persistence = Some(Box::new(handler));
        self
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.pre
    }

    pub fn drain(&self) -> &Drain {
        &self.drain
    }

    pub fn clusters(&self) -> &ClusterStore {
        self.drain.clusters()
    }

    /// Rendering of a wildcard position, `<*>` unless the mask affixes changed.
    pub fn wildcard_marker(&self) -> &str {
        &self.marker
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }

    pub fn render_template(&self, result: &MiningResult) -> String {
        crate::cluster::render_template(&result.template, &self.marker)
    }

    pub fn render_tree(&self, max_clusters: usize) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.drain.tree().render(&mut out, &self.marker, max_clusters);
        out
    }

    pub fn add_line(&mut self, line: &str) -> MiningResult {
        self.profiler.start_section("total");
        self.profiler.start_section("mask");
        let masked = self.pre.mask(line);
        self.profiler.end_section("mask");
        self.profiler.start_section("tokenize");
        let tokens = self.pre.tokenize(&masked);
        self.profiler.end_section("tokenize");
        let result = self.mine(&tokens);
        self.profiler.end_section("total");
        self.report_if_due();
        result
    }

    /// Same as [`add_line`](Self::add_line) for a line already run through
    /// [`Preprocessor::prepare`].
    pub fn add_tokens(&mut self, tokens: &[String]) -> MiningResult {
        self.profiler.start_section("total");
        let result = self.mine(tokens);
        self.profiler.end_section("total");
        self.report_if_due();
        result
    }

    fn mine(&mut self, tokens: &[String]) -> MiningResult {
        self.profiler.start_section("drain");
        let result = self.drain.add_tokens(tokens, &mut self.profiler);
        self.profiler.end_section("drain");
        if let Some(reason) = self.snapshot_reason(&result) {
            if let Err(e) = self.save_state(&reason) {
                tracing::error!(error = %e, reason = %reason, "failed to save snapshot");
            }
        }
        result
    }

    fn report_if_due(&mut self) {
        let every = Duration::from_secs(self.config.profiling.report_interval_secs);
        self.profiler.report_if_due(every);
    }

    fn snapshot_reason(&self, result: &MiningResult) -> Option<String> {
        self.persistence.as_ref()?;
        let snapshot = &self.config.snapshot;
        if snapshot.on_change && result.change_type != ChangeType::None {
            return Some(format!("{} ({})", result.change_type, result.cluster_id));
        }
        let interval = Duration::from_secs(snapshot.interval_minutes.saturating_mul(60));
        if !interval.is_zero() && self.last_save.elapsed() >= interval {
            return Some("periodic".to_string());
        }
        None
    }

    /// Read-only lookup: never creates or loosens a cluster.
    pub fn match_line(&self, line: &str, strategy: SearchStrategy) -> Option<&Cluster> {
        let tokens = self.pre.prepare(line);
        self.drain.match_tokens(&tokens, strategy)
    }

    /// Encodes the current state without touching the persistence handler.
    pub fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        persistence::save(self.drain.clusters(), self.drain.tree(), self.config.snapshot.compress_state)
    }

    /// Replaces the current state with a decoded snapshot.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<DateTime<Utc>, MinerError> {
        let snap = persistence::load(bytes)?;
        let expected = self.config.drain.tree_params();
        if *snap.tree.params() != expected {
            return Err(ConfigError::Invalid(format!(
                "snapshot was taken with tree parameters {:?}, configuration has {:?}",
                snap.tree.params(),
                expected
            ))
            .into());
        }
        self.drain = Drain::from_parts(self.config.drain.similarity_threshold, snap.store, snap.tree);
        Ok(snap.saved_at)
    }

    pub fn save_state(&mut self, reason: &str) -> Result<(), MinerError> {
        if self.persistence.is_none() {
            return Ok(());
        }
        self.profiler.start_section("save_state");
        let encoded = self.snapshot();
        self.profiler.end_section("save_state");
        let bytes = encoded?;
        if let Some(handler) = self.persistence.as_mut() {
            handler.save_state(&bytes)?;
        }
        self.last_save = Instant::now();
        tracing::info!(reason, bytes = bytes.len(), clusters = self.drain.clusters().len(), "saved snapshot");
        Ok(())
    }

    /// Loads the attached snapshot. Absence starts cold; a corrupt snapshot is
    /// logged, reported through [`LoadOutcome::Corrupt`] and also starts cold.
    /// A snapshot built with different tree parameters is a configuration error.
    pub fn load_state(&mut self) -> Result<LoadOutcome, MinerError> {
        let Some(handler) = self.persistence.as_ref() else {
            return Ok(LoadOutcome::NoPersistence);
        };
        let Some(bytes) = handler.load_state()? else {
            tracing::info!("no snapshot found, starting from empty state");
            return Ok(LoadOutcome::Empty);
        };
        match self.restore(&bytes) {
            Ok(saved_at) => {
                let clusters = self.drain.clusters().len();
                tracing::info!(clusters, %saved_at, "restored snapshot");
                Ok(LoadOutcome::Restored { clusters, saved_at })
            }
            Err(MinerError::Snapshot(e)) => {
                tracing::warn!(error = %e, "discarding corrupt snapshot, mining restarts from empty state");
                self.drain = Drain::new(drain_params(&self.config));
                Ok(LoadOutcome::Corrupt(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Values standing behind the wildcard and mask tokens of `template` in the
    /// raw `line`. `None` when the line does not fit the template.
    pub fn extract_parameters(&mut self, template: &str, line: &str) -> Option<Vec<ExtractedParameter>> {
        let pattern = match self.patterns.get(template) {
            Some(p) => p.clone(),
            None => {
                let p = self.build_pattern(template, true).or_else(|| self.build_pattern(template, false));
                self.patterns.put(template.to_string(), p.clone());
                p
            }
        }?;
        let caps = pattern.regex.captures(line.trim())?;
        Some(
            pattern
                .names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    caps.name(&format!("p{i}")).map(|m| ExtractedParameter {
                        value: m.as_str().to_string(),
                        mask_name: name.clone(),
                    })
                })
                .collect(),
        )
    }

    /// Anchored regex for `template`. With `rule_patterns`, a mask label only
    /// captures what its rules would match; otherwise any non-empty text.
    fn build_pattern(&self, template: &str, rule_patterns: bool) -> Option<TemplatePattern> {
        let masker = self.pre.masker();
        let label_re = Regex::new(&format!(
            r"{}(\S+?){}",
            regex::escape(masker.prefix()),
            regex::escape(masker.suffix())
        ))
        .ok()?;
        let delimiters = self.pre.tokenizer().extra_delimiters();
        let sep = if delimiters.is_empty() {
            r"\s+".to_string()
        } else {
            format!(r"(?:\s|{})+", delimiters.iter().map(|d| regex::escape(d)).join("|"))
        };

        let mut pattern = String::from("^");
        let mut names = Vec::new();
        for (i, token) in self.pre.tokenize(template).iter().enumerate() {
            if i > 0 {
                pattern.push_str(&sep);
            }
            let mut last = 0;
            for caps in label_re.captures_iter(token) {
                let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else { continue };
                let label = label.as_str();
                let body = if label == "*" {
                    ".+?".to_string()
                } else {
                    let rules: Vec<String> = masker.patterns_for_label(label).map(|re| format!("(?:{})", re.as_str())).collect();
                    if rules.is_empty() {
                        // not a mask we produce: literal text
                        continue;
                    }
                    if rule_patterns { rules.join("|") } else { ".+?".to_string() }
                };
                pattern.push_str(&regex::escape(&token[last..whole.start()]));
                pattern.push_str(&format!("(?P<p{}>{})", names.len(), body));
                names.push(label.to_string());
                last = whole.end();
            }
            pattern.push_str(&regex::escape(&token[last..]));
        }
        pattern.push('$');
        Regex::new(&pattern).ok().map(|regex| TemplatePattern { regex, names })
    }
}

fn drain_params(config: &MinerConfig) -> DrainParams {
    DrainParams {
        similarity_threshold: config.drain.similarity_threshold,
        tree: config.drain.tree_params(),
    }
}
