//! Similarity scoring and template merging over the prefix tree.

use crate::cluster::{Cluster, ClusterId, ClusterStore, Token};
use crate::profiler::Profiler;
use crate::tree::{PrefixTree, TreeParams};
use std::cmp::Reverse;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    None,
    ClusterCreated,
    TemplateChanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::None => "none",
            ChangeType::ClusterCreated => "cluster_created",
            ChangeType::TemplateChanged => "template_changed",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-line outcome handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningResult {
    pub cluster_id: ClusterId,
    pub change_type: ChangeType,
    pub template: Vec<Token>,
    pub cluster_size: u64,
    pub cluster_count: usize,
}

/// How `match_tokens` looks for a cluster when the tree has no exact fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// Only the tree bucket.
    #[default]
    Never,
    /// The bucket first, then every cluster with the same token count.
    Fallback,
    /// Every cluster with the same token count.
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrainParams {
    pub similarity_threshold: f64,
    pub tree: TreeParams,
}

impl Default for DrainParams {
    fn default() -> Self {
        Self { similarity_threshold: 0.4, tree: TreeParams::default() }
    }
}

/// Share of positions where the line repeats the template's concrete token.
/// Wildcard positions never disqualify a line but add nothing to the score.
pub fn similarity(template: &[Token], tokens: &[String]) -> f64 {
    if template.len() != tokens.len() {
        return 0.0;
    }
    if tokens.is_empty() {
        return 1.0;
    }
    let same = template.iter().zip(tokens).filter(|(t, tok)| t.equals(tok)).count();
    same as f64 / tokens.len() as f64
}

/// True when every concrete template token equals the line token.
fn fits(template: &[Token], tokens: &[String]) -> bool {
    template.len() == tokens.len()
        && template.iter().zip(tokens).all(|(t, tok)| t.is_wildcard() || t.equals(tok))
}

#[derive(Debug, Clone)]
pub struct Drain {
    params: DrainParams,
    store: ClusterStore,
    tree: PrefixTree,
}

impl Drain {
    pub fn new(params: DrainParams) -> Self {
        Self { params, store: ClusterStore::new(), tree: PrefixTree::new(params.tree) }
    }

    /// Reassembles an engine from restored parts. The caller is responsible for
    /// `tree` indexing exactly the clusters of `store`.
    pub fn from_parts(similarity_threshold: f64, store: ClusterStore, tree: PrefixTree) -> Self {
        let params = DrainParams { similarity_threshold, tree: *tree.params() };
        Self { params, store, tree }
    }

    pub fn params(&self) -> &DrainParams {
        &self.params
    }

    pub fn clusters(&self) -> &ClusterStore {
        &self.store
    }

    pub fn tree(&self) -> &PrefixTree {
        &self.tree
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.store.get(id)
    }

    /// Folds one tokenized line into the cluster set.
    pub fn add_tokens(&mut self, tokens: &[String], profiler: &mut Profiler) -> MiningResult {
        profiler.start_section("tree_search");
        let best = self.best_candidate(tokens);
        profiler.end_section("tree_search");

        match best {
            Some(id) => {
                profiler.start_section("cluster_update");
                let update = self.store.update(id, tokens);
                profiler.end_section("cluster_update");
                // bucket ids always share the line's token count, so update succeeds
                let (change_type, cluster_size) = match update {
                    Some(u) if u.changed => (ChangeType::TemplateChanged, u.size),
                    Some(u) => (ChangeType::None, u.size),
                    None => return self.create(tokens, profiler),
                };
                let template = self.store.get(id).map(|c| c.template.clone()).unwrap_or_default();
                MiningResult {
                    cluster_id: id,
                    change_type,
                    template,
                    cluster_size,
                    cluster_count: self.store.len(),
                }
            }
            None => self.create(tokens, profiler),
        }
    }

    fn create(&mut self, tokens: &[String], profiler: &mut Profiler) -> MiningResult {
        profiler.start_section("cluster_create");
        let template: Vec<Token> = tokens.iter().cloned().map(Token::Value).collect();
        let id = self.store.create(template.clone());
        if !self.tree.index(id, &template) {
            tracing::error!(cluster_id = id, "prefix tree shape does not match its parameters; cluster not indexed");
        }
        profiler.end_section("cluster_create");
        tracing::debug!(cluster_id = id, tokens = tokens.len(), "created cluster");
        MiningResult {
            cluster_id: id,
            change_type: ChangeType::ClusterCreated,
            template,
            cluster_size: 1,
            cluster_count: self.store.len(),
        }
    }

    /// Highest-scoring candidate at or above the threshold. Ties go to the larger
    /// cluster, then to the earlier one.
    fn best_candidate(&self, tokens: &[String]) -> Option<ClusterId> {
        let mut best: Option<(f64, u64, ClusterId)> = None;
        for &id in self.tree.find_candidates(tokens) {
            let Some(cluster) = self.store.get(id) else { continue };
            let score = similarity(&cluster.template, tokens);
            let better = match best {
                None => true,
                Some((s, size, _)) => score > s || (score == s && cluster.size > size),
            };
            if better {
                best = Some((score, cluster.size, id));
            }
        }
        best.filter(|(score, _, _)| *score >= self.params.similarity_threshold).map(|(_, _, id)| id)
    }

    /// Read-only lookup: the cluster whose template covers `tokens` entirely.
    /// Prefers the most specific template, then the larger cluster.
    pub fn match_tokens(&self, tokens: &[String], strategy: SearchStrategy) -> Option<&Cluster> {
        let from_tree = || self.best_fit(self.tree.find_candidates(tokens), tokens);
        let full = || self.best_fit(self.store.ids_with_length(tokens.len()), tokens);
        match strategy {
            SearchStrategy::Never => from_tree(),
            SearchStrategy::Fallback => from_tree().or_else(full),
            SearchStrategy::Always => full(),
        }
    }

    fn best_fit(&self, ids: &[ClusterId], tokens: &[String]) -> Option<&Cluster> {
        ids.iter()
            .filter_map(|&id| self.store.get(id))
            .filter(|c| fits(&c.template, tokens))
            .min_by_key(|c| (c.wildcard_count(), Reverse(c.size)))
    }
}
