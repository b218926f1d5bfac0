pub mod aggregator;
pub mod config;
pub mod delay_manager;
pub mod error;
pub mod exporter;
pub mod input_loader;
pub mod logger;
pub mod lookup_client;
pub mod scheduler;

// Exporting types for convenience
pub use config::{AppConfig, SchedulerConfig, BATCH_SIZE, INTER_BATCH_DELAY};
pub use error::{ExportError, LookupError, ParseError, RunFailure};
pub use input_loader::{ArticleRecord, ArticleTable};
pub use lookup_client::{HttpLookupClient, Lookup};
pub use scheduler::{BatchScheduler, ItemResult, ProgressHandle, RunControl, RunProgress, WorkItem};
