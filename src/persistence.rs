//! Binary snapshots of the miner state and the stores that hold them.
//!
//! Layout: `LSFT` magic, format version byte, flags byte, SHA-256 of the
//! payload, payload. The payload is a JSON document, zlib-compressed when
//! flag bit 0 is set. The tree is written as a flat list of leaf routes and
//! rebuilt edge by edge on load, so a restored miner routes lines exactly like
//! the one that was saved and the payload nesting does not grow with
//! `match_depth`.

use crate::cluster::{Cluster, ClusterId, ClusterStore, StoreError};
use crate::tree::{LeafRoute, PrefixTree, TreeError, TreeParams};
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"LSFT";
const FORMAT_VERSION: u8 = 1;
const FLAG_COMPRESSED: u8 = 0b0000_0001;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 2 + DIGEST_LEN;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("snapshot compression failed: {0}")]
    Compression(#[from] std::io::Error),
    #[error("snapshot holds invalid clusters: {0}")]
    InvalidStore(#[from] StoreError),
    #[error("snapshot holds an invalid tree: {0}")]
    InvalidTree(#[from] TreeError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("in-memory snapshot store lock poisoned")]
    Poisoned,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    saved_at: DateTime<Utc>,
    next_cluster_id: ClusterId,
    params: &'a TreeParams,
    clusters: &'a [Cluster],
    leaves: Vec<LeafRoute>,
}

#[derive(Deserialize)]
struct SnapshotDoc {
    saved_at: DateTime<Utc>,
    next_cluster_id: ClusterId,
    params: TreeParams,
    clusters: Vec<Cluster>,
    leaves: Vec<LeafRoute>,
}

/// A decoded, validated snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    pub store: ClusterStore,
    pub tree: PrefixTree,
}

pub fn save(store: &ClusterStore, tree: &PrefixTree, compress: bool) -> Result<Vec<u8>, SnapshotError> {
    let doc = SnapshotRef {
        saved_at: Utc::now(),
        next_cluster_id: store.next_id(),
        params: tree.params(),
        clusters: store.clusters(),
        leaves: tree.leaves(),
    };
    let json = serde_json::to_vec(&doc)?;
    let (flags, payload) = if compress {
        let mut enc = ZlibEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
        enc.write_all(&json)?;
        (FLAG_COMPRESSED, enc.finish()?)
    } else {
        (0, json)
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(flags);
    out.extend_from_slice(&Sha256::digest(&payload));
    out.extend_from_slice(&payload);
    Ok(out)
}

fn corrupt(reason: impl Into<String>) -> SnapshotError {
    SnapshotError::Corrupt(reason.into())
}

pub fn load(bytes: &[u8]) -> Result<Snapshot, SnapshotError> {
    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("{} bytes is shorter than the header", bytes.len())));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    if &header[..4] != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = header[4];
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    let flags = header[5];
    if flags & !FLAG_COMPRESSED != 0 {
        return Err(corrupt(format!("unknown flags {flags:#04x}")));
    }
    if Sha256::digest(payload).as_slice() != &header[6..] {
        return Err(corrupt("payload digest mismatch"));
    }

    let json = if flags & FLAG_COMPRESSED != 0 {
        let mut buf = Vec::new();
        ZlibDecoder::new(payload)
            .read_to_end(&mut buf)
            .map_err(|e| corrupt(format!("decompression failed: {e}")))?;
        buf
    } else {
        payload.to_vec()
    };
    let doc: SnapshotDoc = serde_json::from_slice(&json).map_err(|e| corrupt(format!("undecodable payload: {e}")))?;

    if doc.params.match_depth == 0 || doc.params.max_children == 0 {
        return Err(corrupt("tree parameters out of range"));
    }
    let store = ClusterStore::from_clusters(doc.clusters)?;
    if doc.next_cluster_id != store.next_id() {
        return Err(corrupt(format!(
            "next cluster id {} does not follow {} clusters",
            doc.next_cluster_id,
            store.len()
        )));
    }
    let tree = PrefixTree::from_leaves(doc.params, doc.leaves)?;
    tree.validate(&store)?;
    Ok(Snapshot { saved_at: doc.saved_at, store, tree })
}

/// Where snapshots live between runs.
pub trait PersistenceHandler: Send {
    fn save_state(&mut self, state: &[u8]) -> Result<(), PersistenceError>;
    /// `Ok(None)` when nothing was saved yet.
    fn load_state(&self) -> Result<Option<Vec<u8>>, PersistenceError>;
}

/// Snapshot kept in a single named file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io { path: self.path.clone(), source }
    }
}

impl PersistenceHandler for FilePersistence {
    fn save_state(&mut self, state: &[u8]) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, state).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    fn load_state(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

/// Snapshot held in memory. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    state: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl PersistenceHandler for MemoryPersistence {
    fn save_state(&mut self, state: &[u8]) -> Result<(), PersistenceError> {
        let mut slot = self.state.lock().map_err(|_| PersistenceError::Poisoned)?;
        *slot = Some(state.to_vec());
        Ok(())
    }

    fn load_state(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        let slot = self.state.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(slot.clone())
    }
}
