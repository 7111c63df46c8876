//! Prefix search tree over (token count, leading tokens).
//!
//! The tree never owns cluster data. Leaf buckets hold [`ClusterId`]s that
//! point into the [`ClusterStore`](crate::cluster::ClusterStore).

use crate::cluster::{ClusterId, ClusterStore, Token};
use ahash::RandomState;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write};
use thiserror::Error;

type Children = HashMap<String, Node, RandomState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Number of leading token positions used for indexing.
    pub match_depth: usize,
    /// Cap on children per internal node, wildcard child included.
    pub max_children: usize,
    /// Route tokens containing digits through the wildcard child.
    pub parametrize_numeric_tokens: bool,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self { match_depth: 4, max_children: 100, parametrize_numeric_tokens: true }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("inner node below leaf depth {depth} for length {length}")]
    InnerBelowLeaf { depth: usize, length: usize },
    #[error("leaf at level {level}, expected {depth} for length {length}")]
    LeafDepth { level: usize, depth: usize, length: usize },
    #[error("unknown cluster id {0} in tree")]
    UnknownCluster(ClusterId),
    #[error("cluster {id} has {tokens} tokens but is indexed under length {length}")]
    WrongLength { id: ClusterId, tokens: usize, length: usize },
    #[error("cluster {0} indexed more than once")]
    IndexedTwice(ClusterId),
    #[error("{stored} clusters stored but {indexed} indexed")]
    Unindexed { stored: usize, indexed: usize },
    #[error("leaf route of {found} edges under length {length}, expected {expected}")]
    RouteLength { length: usize, found: usize, expected: usize },
    #[error("leaf route listed twice under length {0}")]
    DuplicateRoute(usize),
}

/// One root-to-leaf route. `None` edges go through the wildcard child.
/// The list of routes describes a tree completely and stays flat however
/// deep the tree is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafRoute {
    pub length: usize,
    pub path: Vec<Option<String>>,
    pub clusters: Vec<ClusterId>,
}

#[derive(Debug, Clone, Default)]
pub struct Branch {
    pub values: Children,
    pub wildcard: Option<Box<Node>>,
}

impl Branch {
    fn child_count(&self) -> usize {
        self.values.len() + usize::from(self.wildcard.is_some())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bucket {
    pub clusters: Vec<ClusterId>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Inner(Branch),
    Leaf(Bucket),
}

impl Node {
    fn empty(leaf: bool) -> Self {
        if leaf {
            Node::Leaf(Bucket::default())
        } else {
            Node::Inner(Branch::default())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrefixTree {
    params: TreeParams,
    roots: HashMap<usize, Node, RandomState>,
}

fn has_digit(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_digit())
}

impl PrefixTree {
    pub fn new(params: TreeParams) -> Self {
        Self { params, roots: HashMap::default() }
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    fn prefix_len(&self, token_count: usize) -> usize {
        self.params.match_depth.min(token_count)
    }

    /// Candidate cluster ids for a tokenized line. Empty when no path exists.
    pub fn find_candidates(&self, tokens: &[String]) -> &[ClusterId] {
        let Some(mut node) = self.roots.get(&tokens.len()) else {
            return &[];
        };
        for token in &tokens[..self.prefix_len(tokens.len())] {
            let Node::Inner(branch) = node else { break };
            node = match branch.values.get(token.as_str()) {
                Some(child) => child,
                None => match &branch.wildcard {
                    Some(child) => child,
                    None => return &[],
                },
            };
        }
        match node {
            Node::Leaf(bucket) => &bucket.clusters,
            Node::Inner(_) => &[],
        }
    }

    /// Puts `id` into the bucket its template routes to. Returns false only
    /// when the tree shape disagrees with the configured depth.
    pub fn index(&mut self, id: ClusterId, template: &[Token]) -> bool {
        let depth = self.prefix_len(template.len());
        let params = self.params;
        let mut node = self.roots.entry(template.len()).or_insert_with(|| Node::empty(depth == 0));
        for (level, token) in template[..depth].iter().enumerate() {
            let Node::Inner(branch) = node else { return false };
            node = descend_for_insert(branch, token, level + 1 == depth, &params);
        }
        match node {
            Node::Leaf(bucket) => {
                bucket.clusters.push(id);
                true
            }
            Node::Inner(_) => false,
        }
    }

    /// Checks that every leaf sits at the expected depth and that each cluster
    /// of `store` is indexed exactly once under its own token count.
    pub fn validate(&self, store: &ClusterStore) -> Result<(), TreeError> {
        let mut seen = HashSet::with_capacity(store.len());
        for (&length, root) in &self.roots {
            let depth = self.prefix_len(length);
            self.validate_node(root, 0, depth, length, store, &mut seen)?;
        }
        if seen.len() != store.len() {
            return Err(TreeError::Unindexed { stored: store.len(), indexed: seen.len() });
        }
        Ok(())
    }

    fn validate_node(
        &self,
        node: &Node,
        level: usize,
        depth: usize,
        length: usize,
        store: &ClusterStore,
        seen: &mut HashSet<ClusterId>,
    ) -> Result<(), TreeError> {
        match node {
            Node::Inner(branch) => {
                if level >= depth {
                    return Err(TreeError::InnerBelowLeaf { depth, length });
                }
                for child in branch.values.values().chain(branch.wildcard.as_deref()) {
                    self.validate_node(child, level + 1, depth, length, store, seen)?;
                }
                Ok(())
            }
            Node::Leaf(bucket) => {
                if level != depth {
                    return Err(TreeError::LeafDepth { level, depth, length });
                }
                for &id in &bucket.clusters {
                    let cluster = store.get(id).ok_or(TreeError::UnknownCluster(id))?;
                    if cluster.token_count() != length {
                        return Err(TreeError::WrongLength { id, tokens: cluster.token_count(), length });
                    }
                    if !seen.insert(id) {
                        return Err(TreeError::IndexedTwice(id));
                    }
                }
                Ok(())
            }
        }
    }

    /// Every leaf with the route leading to it, ordered by length then key.
    pub fn leaves(&self) -> Vec<LeafRoute> {
        let mut out = Vec::new();
        for length in self.roots.keys().copied().sorted() {
            collect_leaves(&self.roots[&length], length, &mut Vec::new(), &mut out);
        }
        out
    }

    /// Rebuilds the tree that [`leaves`](Self::leaves) listed. Routes are
    /// replayed edge by edge, so `max_children` plays no part here.
    pub fn from_leaves(params: TreeParams, leaves: Vec<LeafRoute>) -> Result<Self, TreeError> {
        let mut tree = Self::new(params);
        for leaf in leaves {
            let length = leaf.length;
            let depth = tree.prefix_len(length);
            if leaf.path.len() != depth {
                return Err(TreeError::RouteLength { length, found: leaf.path.len(), expected: depth });
            }
            let mut node = tree.roots.entry(length).or_insert_with(|| Node::empty(depth == 0));
            for (level, edge) in leaf.path.into_iter().enumerate() {
                let Node::Inner(branch) = node else {
                    return Err(TreeError::DuplicateRoute(length));
                };
                let last = level + 1 == depth;
                node = match edge {
                    Some(value) => branch.values.entry(value).or_insert_with(|| Node::empty(last)),
                    None => branch.wildcard.get_or_insert_with(|| Box::new(Node::empty(last))),
                };
            }
            match node {
                Node::Leaf(bucket) if bucket.clusters.is_empty() => bucket.clusters = leaf.clusters,
                _ => return Err(TreeError::DuplicateRoute(length)),
            }
        }
        Ok(tree)
    }

    /// Writes the tree shape, one node per line. Leaves list up to
    /// `max_clusters` of their ids.
    pub fn render<W: Write>(&self, out: &mut W, marker: &str, max_clusters: usize) -> fmt::Result {
        writeln!(out, "<root>")?;
        for length in self.roots.keys().copied().sorted() {
            writeln!(out, "\t<L={length}>")?;
            render_node(out, &self.roots[&length], 2, marker, max_clusters)?;
        }
        Ok(())
    }
}

fn render_node<W: Write>(out: &mut W, node: &Node, indent: usize, marker: &str, max_clusters: usize) -> fmt::Result {
    let pad = "\t".repeat(indent);
    match node {
        Node::Leaf(bucket) => {
            let shown = bucket.clusters.iter().take(max_clusters).join(", ");
            let more = bucket.clusters.len().saturating_sub(max_clusters);
            if more > 0 {
                writeln!(out, "{pad}clusters=[{shown}] (+{more} more)")
            } else {
                writeln!(out, "{pad}clusters=[{shown}]")
            }
        }
        Node::Inner(branch) => {
            for key in branch.values.keys().sorted() {
                writeln!(out, "{pad}\"{key}\"")?;
                render_node(out, &branch.values[key], indent + 1, marker, max_clusters)?;
            }
            if let Some(child) = &branch.wildcard {
                writeln!(out, "{pad}{marker}")?;
                render_node(out, child, indent + 1, marker, max_clusters)?;
            }
            Ok(())
        }
    }
}

fn collect_leaves(node: &Node, length: usize, path: &mut Vec<Option<String>>, out: &mut Vec<LeafRoute>) {
    match node {
        Node::Leaf(bucket) => out.push(LeafRoute { length, path: path.clone(), clusters: bucket.clusters.clone() }),
        Node::Inner(branch) => {
            for key in branch.values.keys().sorted() {
                path.push(Some(key.clone()));
                collect_leaves(&branch.values[key], length, path, out);
                path.pop();
            }
            if let Some(child) = &branch.wildcard {
                path.push(None);
                collect_leaves(child, length, path, out);
                path.pop();
            }
        }
    }
}

fn descend_for_insert<'a>(branch: &'a mut Branch, token: &Token, leaf: bool, params: &TreeParams) -> &'a mut Node {
    let value = match token {
        Token::Wildcard => None,
        Token::Value(v) if params.parametrize_numeric_tokens && has_digit(v) => None,
        Token::Value(v) => Some(v),
    };
    if let Some(v) = value {
        let count = branch.child_count();
        // without a wildcard child yet, keep one slot free for it
        let room = if branch.wildcard.is_some() {
            count < params.max_children
        } else {
            count + 1 < params.max_children
        };
        if room || branch.values.contains_key(v.as_str()) {
            return branch.values.entry(v.clone()).or_insert_with(|| Node::empty(leaf));
        }
    }
    branch.wildcard.get_or_insert_with(|| Box::new(Node::empty(leaf)))
}
