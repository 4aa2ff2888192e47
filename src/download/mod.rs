//! Download management and processing

pub mod error;
pub mod extract;
pub mod pipeline;
pub mod progress;

// Re-exports for convenience
pub use error::DownloadError;
pub use extract::{StreamCatalog, StreamDescriptor, StreamExtractor, YtDlpExtractor};
pub use pipeline::{DownloadTask, Pipeline};
pub use progress::{ProgressReporter, ProgressSink};
