//! Verification pipeline and file utilities

pub mod aggregator;
pub mod classification;
pub mod cleaner;
pub mod extensions;
pub mod interrupt;
pub mod logging;
pub mod pool;
pub mod probe;
pub mod scanner;
pub mod verifier;

pub use aggregator::{Classification, IncompleteClassification, ResultAggregator};
pub use classification::{ClassificationResult, MediaFile, Verdict};
pub use cleaner::{DeletionError, DeletionFailure, DeletionReport};
pub use extensions::{ExtensionCensus, SortReport, census, sort_by_extension};
pub use interrupt::watch_interrupts;
pub use logging::{LogFormat, init_tracing};
pub use pool::{PoolReport, WorkerPool};
pub use probe::{CommandProbe, PlaybackProbe, ProbeError, ProbeOutcome};
pub use scanner::{DiscoveryError, ExtensionFilter, TaskQueue, discover};
pub use verifier::{RunSummary, verify};
