//! `hmo-linkage`: address matching and geographic merge engine.
//!
//! Links records describing the same property across datasets without a
//! shared identifier, then folds matched or spatially aggregated data back
//! onto a reference frame. Pure engine crate: receives pre-loaded CSV/TOML
//! text or in-memory values, returns typed results. No CLI or file IO.

pub mod assemble;
pub mod candidates;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod similarity;
pub mod spatial;

pub use config::{DatasetSchema, LinkConfig, MergeConfig};
pub use engine::{apply_step, link, run, LinkInput};
pub use error::LinkageError;
pub use frame::{CsvOptions, Frame, Value};
pub use merge::{by_geography, by_key, MergeResult, Provenance};
pub use model::{CandidateTable, LinkResult, Record, RecordSet};
pub use spatial::{by_buffer, BufferStats, Geometry, Statistic};
