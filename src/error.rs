//! Error types and result handling for record-publisher.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Every error is fatal to the task that raised it: nothing is retried or
//! skipped locally, the task aborts and the error travels up to whoever
//! drives the task.
//!
//! # Example
//!
//! ```rust
//! use record_publisher::{Error, ErrorKind, Result};
//!
//! fn validate() -> Result<()> {
//!     Err(Error::MissingField("topic"))
//! }
//!
//! match validate() {
//!     Ok(()) => println!("Valid"),
//!     Err(e) if e.kind() == ErrorKind::Config => eprintln!("{}: {}", e.code(), e),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use crate::broker::BrokerError;
use thiserror::Error;

/// The main error type for record-publisher operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required writer parameter is absent or empty.
    #[error("Missing required configuration field: {0}")]
    MissingField(&'static str),

    /// Configuration could not be loaded, typically from a file or environment.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The broker client could not be created for the endpoint.
    #[error("Failed to create broker client. serviceUrl: {service_url}")]
    ClientCreation {
        service_url: String,
        #[source]
        source: BrokerError,
    },

    /// The producer could not be created for the topic.
    #[error("Failed to create producer. serviceUrl: {service_url}, topic: {topic}")]
    ProducerCreation {
        service_url: String,
        topic: String,
        #[source]
        source: BrokerError,
    },

    /// A record has fewer columns than the configured column list.
    #[error("Record has {arity} columns, column {index} is out of bounds")]
    Encoding {
        /// First configured position that the record cannot satisfy
        index: usize,
        /// Number of columns actually present in the record
        arity: usize,
    },

    /// Publishing a message failed.
    #[error("Failed to send message. serviceUrl: {service_url}, topic: {topic}")]
    Send {
        service_url: String,
        topic: String,
        #[source]
        source: BrokerError,
    },

    /// The upstream record source failed to produce the next record.
    #[error("Record source error: {0}")]
    Source(String),

    /// A lifecycle operation was called out of order.
    #[error("Cannot {operation} a task in state {state}")]
    InvalidState {
        operation: &'static str,
        state: crate::task::TaskState,
    },

    /// JSON serialization error when encoding messages.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from reading the record stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`], matching the failure stages of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Encoding,
    Send,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingField(_) | Error::Config(_) => ErrorKind::Config,
            Error::ClientCreation { .. } | Error::ProducerCreation { .. } => ErrorKind::Connection,
            Error::Encoding { .. } | Error::Serialization(_) => ErrorKind::Encoding,
            Error::Send { .. } => ErrorKind::Send,
            Error::Source(_) | Error::InvalidState { .. } | Error::Io(_) => ErrorKind::Other,
        }
    }

    /// Stable error code, shared with the job-level error reporting of the
    /// upstream pipeline.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingField(crate::config::PARAMETER_SERVICE_URL) => {
                "PULSAR_CONN_SERVICE_URL_MISSING"
            }
            Error::MissingField(crate::config::PARAMETER_TOPIC) => "PULSAR_CONN_TOPIC_MISSING",
            Error::MissingField(_) => "PULSAR_COLUMN_MISSING",
            Error::Config(_) => "PULSAR_CONFIG_ERROR",
            Error::ClientCreation { .. } => "PULSAR_CONN_SERVICE_URL_ERROR",
            Error::ProducerCreation { .. } => "PULSAR_CONN_BUILD_PRODUCER_ERROR",
            Error::Encoding { .. } | Error::Serialization(_) => "PULSAR_RECORD_ENCODING_ERROR",
            Error::Send { .. } => "PULSAR_CONN_SEND_MESSAGE_ERROR",
            Error::Source(_) | Error::Io(_) => "PULSAR_RECORD_SOURCE_ERROR",
            Error::InvalidState { .. } => "PULSAR_TASK_STATE_ERROR",
        }
    }
}

/// A convenient Result type alias for record-publisher operations.
///
/// This is equivalent to `std::result::Result<T, record_publisher::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
