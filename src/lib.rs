pub mod cluster;
pub mod config;
pub mod drain;
pub mod input;
pub mod masking;
pub mod miner;
pub mod persistence;
pub mod profiler;
pub mod report;
pub mod tokenizer;
pub mod tree;

pub use cluster::{Cluster, ClusterId, ClusterStore, StoreError, Token, WILDCARD};
pub use config::{ConfigError, MinerConfig};
pub use drain::{ChangeType, MiningResult, SearchStrategy};
pub use miner::{ExtractedParameter, LoadOutcome, MinerError, Preprocessor, TemplateMiner};
pub use persistence::{FilePersistence, MemoryPersistence, PersistenceHandler, SnapshotError};
pub use profiler::Profiler;
pub use tree::TreeError;
