// Foldwise - Real-time serving layer for matrix factorization recommenders
// Latent user/item vectors, in-place fold-in updates, parallel top-N queries

pub mod error;
pub mod collections;
pub mod ids;
pub mod vectors;
pub mod solver;
pub mod foldin;
pub mod topn;
pub mod candidates;
pub mod generation;
pub mod eventlog;
pub mod loader;
pub mod config;
pub mod engine;
pub mod ingest;

// Re-export main types
pub use error::{ServingError, ServingResult};
pub use engine::{Ranked, ServingEngine};
pub use config::EngineConfig;
pub use generation::{Generation, GenerationBuilder};
pub use ids::StringLongMapping;
pub use candidates::{CandidatePartitioner, EvenPartitioner, PairRescorer, Rescorer};
pub use eventlog::{DiskEventLog, EventLog, EventLogConfig, EventLogMode, NoOpEventLog};
pub use loader::{GenerationLoader, JsonSnapshotLoader, StaticLoader};
pub use solver::{CholeskySolver, Solver};
pub use topn::NumericIdValue;
pub use ingest::IngestRecord;
