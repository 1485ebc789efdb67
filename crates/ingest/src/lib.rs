pub mod error;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod store;

pub use error::IngestError;
pub use parser::{LineParser, VendorLogParser};
pub use pipeline::{Archiver, RunSummary};
pub use progress::ProgressTracker;
pub use store::{EventStore, SqliteEventStore, StoreError};
