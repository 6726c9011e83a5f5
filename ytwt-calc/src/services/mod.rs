//! Pipeline services
//!
//! Leaf-first: history parsing, batching, rate governing, metadata lookup,
//! resolution and accumulation.

pub mod accumulator;
pub mod batcher;
pub mod history_parser;
pub mod metadata_resolver;
pub mod metadata_source;
pub mod rate_governor;
pub mod youtube_client;

pub use accumulator::Accumulator;
pub use batcher::{make_batches, Batch};
pub use history_parser::{load_history_file, parse_history, HistorySummary, ParsedHistory};
pub use metadata_resolver::{BatchResolution, MetadataResolver};
pub use metadata_source::{ApiToken, ServiceError, VideoMetadataSource, VideoRecord};
pub use rate_governor::{AdmissionError, RateGovernor};
pub use youtube_client::YouTubeClient;
