use ahash::RandomState;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Stable cluster identity. Ids start at 0 and are never reused.
pub type ClusterId = u64;

/// Rendering of a wildcard position when no mask prefix/suffix is configured.
pub const WILDCARD: &str = "<*>";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    Value(String),
    Wildcard,
}

impl Token {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Token::Wildcard)
    }

    /// True when the token equals `other` verbatim. Wildcards never do.
    pub fn equals(&self, other: &str) -> bool {
        matches!(self, Token::Value(v) if v == other)
    }

    pub fn render<'a>(&'a self, marker: &'a str) -> &'a str {
        match self {
            Token::Value(v) => v.as_str(),
            Token::Wildcard => marker,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render(WILDCARD))
    }
}

pub fn render_template(template: &[Token], marker: &str) -> String {
    template.iter().map(|t| t.render(marker)).join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub template: Vec<Token>,
    pub size: u64,
}

impl Cluster {
    pub fn token_count(&self) -> usize {
        self.template.len()
    }

    pub fn wildcard_count(&self) -> usize {
        self.template.iter().filter(|t| t.is_wildcard()).count()
    }

    pub fn template_string(&self, marker: &str) -> String {
        render_template(&self.template, marker)
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID={:<5} : size={:<10}: {}", self.id, self.size, self.template_string(WILDCARD))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("cluster at position {position} has id {id}, ids must run 0..n in order")]
    OutOfOrder { position: usize, id: ClusterId },
    #[error("cluster {0} has size 0")]
    EmptyCluster(ClusterId),
}

/// Outcome of folding one line into an existing cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    pub changed: bool,
    pub size: u64,
}

/// Owner of every cluster record. Ids index straight into `clusters`.
#[derive(Debug, Clone, Default)]
pub struct ClusterStore {
    clusters: Vec<Cluster>,
    by_length: HashMap<usize, Vec<ClusterId>, RandomState>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a persisted cluster list. Ids must run 0..n in order.
    pub fn from_clusters(clusters: Vec<Cluster>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for (position, cluster) in clusters.into_iter().enumerate() {
            if cluster.id != position as ClusterId {
                return Err(StoreError::OutOfOrder { position, id: cluster.id });
            }
            if cluster.size == 0 {
                return Err(StoreError::EmptyCluster(cluster.id));
            }
            store.by_length.entry(cluster.token_count()).or_default().push(cluster.id);
            store.clusters.push(cluster);
        }
        Ok(store)
    }

    pub fn next_id(&self) -> ClusterId {
        self.clusters.len() as ClusterId
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        usize::try_from(id).ok().and_then(|i| self.clusters.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    /// Ids of every cluster whose template has `token_count` tokens, in creation order.
    pub fn ids_with_length(&self, token_count: usize) -> &[ClusterId] {
        self.by_length.get(&token_count).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn create(&mut self, template: Vec<Token>) -> ClusterId {
        let id = self.next_id();
        self.by_length.entry(template.len()).or_default().push(id);
        self.clusters.push(Cluster { id, template, size: 1 });
        id
    }

    /// Folds `tokens` into cluster `id`: bumps the size and wildcards every
    /// concrete position that disagrees. Returns `None` for an unknown id or a
    /// token count that differs from the template.
    pub fn update(&mut self, id: ClusterId, tokens: &[String]) -> Option<Update> {
        let cluster = usize::try_from(id).ok().and_then(|i| self.clusters.get_mut(i))?;
        if cluster.template.len() != tokens.len() {
            return None;
        }
        let mut changed = false;
        for (slot, token) in cluster.template.iter_mut().zip(tokens) {
            if let Token::Value(v) = slot {
                if v != token {
                    *slot = Token::Wildcard;
                    changed = true;
                }
            }
        }
        cluster.size += 1;
        Some(Update { changed, size: cluster.size })
    }

    /// All clusters, largest first. Order among equal sizes is unspecified.
    pub fn export_by_size(&self) -> Vec<&Cluster> {
        let mut out: Vec<&Cluster> = self.clusters.iter().collect();
        out.sort_by(|a, b| b.size.cmp(&a.size));
        out
    }

    pub(crate) fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }
}
