//! Broker capability used by publish tasks.
//!
//! A task only ever talks to a broker through three calls: connect, create a
//! string-schema producer for one topic, and send. Backends implement the
//! traits below; [`DefaultConnector`] picks one from the service URL scheme.

pub mod kafka;
pub mod memory;
pub mod pulsar;

use crate::config::Properties;
use async_trait::async_trait;
use thiserror::Error;

pub use self::kafka::KafkaConnector;
pub use self::memory::MemoryBroker;
pub use self::pulsar::PulsarConnector;

/// Transport-level failures reported by a broker backend.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Pulsar error: {0}")]
    Pulsar(#[from] ::pulsar::Error),

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Broker error: {0}")]
    Memory(String),

    #[error("{0} already closed")]
    Closed(&'static str),

    #[error("Unsupported service URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid client property {key}: {message}")]
    InvalidProperty { key: String, message: String },
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Opens connections to a broker endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, service_url: &str, props: &Properties) -> BrokerResult<Box<dyn Connection>>;
}

/// An open client connection. Owned by exactly one task.
#[async_trait]
pub trait Connection: Send {
    /// Creates a producer bound to `topic` with a string payload schema.
    async fn create_producer(&mut self, topic: &str) -> BrokerResult<Box<dyn Producer>>;

    async fn close(&mut self) -> BrokerResult<()>;
}

#[async_trait]
pub trait Producer: Send {
    /// Publishes one message and waits for the broker acknowledgement.
    async fn send(&mut self, key: Option<&str>, payload: &str) -> BrokerResult<()>;

    async fn close(&mut self) -> BrokerResult<()>;
}

/// Dispatches on the service URL scheme: `pulsar://` and `pulsar+ssl://` go
/// to Pulsar, `kafka://` goes to Kafka.
#[derive(Debug, Default, Clone)]
pub struct DefaultConnector {
    pulsar: PulsarConnector,
    kafka: KafkaConnector,
}

impl DefaultConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, service_url: &str, props: &Properties) -> BrokerResult<Box<dyn Connection>> {
        match scheme(service_url) {
            Some("pulsar") | Some("pulsar+ssl") => self.pulsar.connect(service_url, props).await,
            Some("kafka") => self.kafka.connect(service_url, props).await,
            _ => Err(BrokerError::UnsupportedScheme(service_url.to_string())),
        }
    }
}

fn scheme(service_url: &str) -> Option<&str> {
    service_url.split_once("://").map(|(scheme, _)| scheme)
}

/// Case-insensitive property lookup; file loaders may lowercase keys.
pub(crate) fn find_prop<'a>(props: &'a Properties, key: &str) -> Option<&'a serde_json::Value> {
    props
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}
