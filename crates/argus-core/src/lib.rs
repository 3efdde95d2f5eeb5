pub mod circuit;
pub mod detect;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod manual;
pub mod models;
pub mod noise;
pub mod pace;
pub mod publish;
pub mod reconcile;
pub mod scan;
pub mod score;
pub mod testutil;
pub mod traits;

pub use error::MonitorError;
pub use models::{
    CandidateRecord, Change, ComplianceItem, ItemOrigin, Profile, Snapshot, Source, compute_hash,
};
pub use traits::{ChangeStore, Cleaner, Extractor, Fetcher, SnapshotStore, SourceStore};
