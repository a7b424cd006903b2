use std::io;
use thiserror::Error;

/// Error types for span export operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// Transport-layer error (network, gRPC, HTTP, file I/O)
    #[error("transport error: {0}")]
    Transport(String),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Export did not finish within `export_timeout`
    #[error("export operation timed out")]
    Timeout,
    /// Exporter has already been shut down
    #[error("exporter is shut down")]
    Shutdown,
}

/// Rejected `BatchConfig` values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_queue_size must be greater than zero")]
    ZeroQueueSize,
    #[error("max_export_batch_size must be greater than zero")]
    ZeroBatchSize,
    #[error("max_export_batch_size ({batch}) exceeds max_queue_size ({queue})")]
    BatchExceedsQueue { batch: usize, queue: usize },
    #[error("schedule_delay must be greater than zero")]
    ZeroScheduleDelay,
}

/// Errors from constructing a `BatchProcessor`
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("invalid batch configuration: {0}")]
    Config(#[from] ConfigError),
    /// Building the worker's I/O runtime failed
    #[error("failed to build export runtime: {0}")]
    Runtime(#[source] io::Error),
    /// Spawning the worker thread failed
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}
