//! The per-task publishing pipeline.
//!
//! A [`PublishTask`] owns one broker connection and one producer. It moves
//! through `Uninitialized -> Initialized -> Prepared -> Running -> Stopped`,
//! or into `Failed` on the first error. [`PublishTask::teardown`] runs from
//! any state, never fails, and releases whatever handles were acquired.
//!
//! Publishing is strictly sequential: a record is pulled only after the
//! previous message was acknowledged, so messages of one task reach the
//! broker in upstream order. No timeout is enforced here; a stuck send is
//! bounded only by the broker client's own timeouts.

use crate::broker::{Connection, Connector, Producer};
use crate::config::{TaskConfig, WriterConfig};
use crate::encoder::MessageEncoder;
use crate::source::RecordSource;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Uninitialized,
    Initialized,
    Prepared,
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Uninitialized => "uninitialized",
            TaskState::Initialized => "initialized",
            TaskState::Prepared => "prepared",
            TaskState::Running => "running",
            TaskState::Stopped => "stopped",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct PublishTask {
    connector: Arc<dyn Connector>,
    state: TaskState,
    config: Option<TaskConfig>,
    encoder: Option<MessageEncoder>,
    connection: Option<Box<dyn Connection>>,
    producer: Option<Box<dyn Producer>>,
    sent: u64,
}

impl PublishTask {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: TaskState::Uninitialized,
            config: None,
            encoder: None,
            connection: None,
            producer: None,
            sent: 0,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Key index used by the run loop, after out-of-range values were dropped.
    pub fn key_index(&self) -> Option<usize> {
        self.config.as_ref().and_then(TaskConfig::effective_key_index)
    }

    /// Messages acknowledged so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Validates the writer parameters, then opens the connection and the
    /// producer. Nothing is contacted when validation fails.
    pub async fn initialize(&mut self, config: WriterConfig) -> Result<()> {
        self.expect_state(TaskState::Uninitialized, "initialize")?;

        let result = self.open(config).await;
        self.state = match result {
            Ok(()) => TaskState::Initialized,
            Err(_) => TaskState::Failed,
        };
        result
    }

    async fn open(&mut self, config: WriterConfig) -> Result<()> {
        let config = config.validate()?;

        if let Some(index) = config.key_index {
            if index >= config.columns.len() {
                warn!(
                    "Key index {} out of range for {} columns, sending without key",
                    index,
                    config.columns.len()
                );
            }
        }

        info!(
            service_url = %config.service_url,
            topic = %config.topic,
            columns = config.columns.len(),
            key_index = ?config.effective_key_index(),
            "Initializing publish task"
        );

        let connection = self
            .connector
            .connect(&config.service_url, &config.extra_props)
            .await
            .map_err(|source| Error::ClientCreation {
                service_url: config.service_url.clone(),
                source,
            })?;
        let connection = self.connection.insert(connection);

        let producer = connection
            .create_producer(&config.topic)
            .await
            .map_err(|source| Error::ProducerCreation {
                service_url: config.service_url.clone(),
                topic: config.topic.clone(),
                source,
            })?;
        self.producer = Some(producer);

        self.encoder = Some(MessageEncoder::new(
            config.columns.clone(),
            config.effective_key_index(),
        ));
        self.config = Some(config);
        Ok(())
    }

    /// Hook for pre-flight work such as topic provisioning. Does nothing.
    pub async fn prepare(&mut self) -> Result<()> {
        self.expect_state(TaskState::Initialized, "prepare")?;
        self.state = TaskState::Prepared;
        Ok(())
    }

    /// Publishes every record of `source` in order and returns how many were
    /// sent. The first encoding or send failure aborts the run; records
    /// after it are never pulled.
    #[instrument(skip_all)]
    pub async fn run<S>(&mut self, source: &mut S) -> Result<u64>
    where
        S: RecordSource + ?Sized,
    {
        self.expect_state(TaskState::Prepared, "run")?;
        self.state = TaskState::Running;
        info!("Start publishing records");

        let result = self.publish_all(source).await;
        match &result {
            Ok(count) => {
                info!("Published {} records", count);
                self.state = TaskState::Stopped;
            }
            Err(e) => {
                error!("Publishing aborted after {} records: {}", self.sent, e);
                self.state = TaskState::Failed;
            }
        }
        result
    }

    async fn publish_all<S>(&mut self, source: &mut S) -> Result<u64>
    where
        S: RecordSource + ?Sized,
    {
        let (config, encoder, producer) =
            match (&self.config, &self.encoder, self.producer.as_mut()) {
                (Some(config), Some(encoder), Some(producer)) => (config, encoder, producer),
                _ => {
                    return Err(Error::InvalidState {
                        operation: "run",
                        state: self.state,
                    })
                }
            };

        while let Some(record) = source.next_record().await? {
            let message = encoder.encode(&record)?;
            debug!("send data. key: {:?}, value: {}", message.key, message.payload);

            producer
                .send(message.key.as_deref(), &message.payload)
                .await
                .map_err(|source| Error::Send {
                    service_url: config.service_url.clone(),
                    topic: config.topic.clone(),
                    source,
                })?;
            self.sent += 1;
        }

        Ok(self.sent)
    }

    /// Hook mirroring [`PublishTask::prepare`]. Does nothing.
    pub async fn post(&mut self) -> Result<()> {
        self.expect_state(TaskState::Stopped, "post")?;
        Ok(())
    }

    /// Closes the producer, then the connection. Close failures are logged
    /// and swallowed. Safe to call repeatedly and from any state.
    pub async fn teardown(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            if let Err(e) = producer.close().await {
                error!("Failed to close producer: {}", e);
            }
        }

        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                error!("Failed to close broker client: {}", e);
            }
        }

        debug!("Publish task torn down in state {}", self.state);
    }

    /// Runs the whole lifecycle and always tears down, returning the first
    /// error encountered.
    pub async fn execute<S>(&mut self, config: WriterConfig, source: &mut S) -> Result<u64>
    where
        S: RecordSource + ?Sized,
    {
        let result = self.run_lifecycle(config, source).await;
        self.teardown().await;
        result
    }

    async fn run_lifecycle<S>(&mut self, config: WriterConfig, source: &mut S) -> Result<u64>
    where
        S: RecordSource + ?Sized,
    {
        self.initialize(config).await?;
        self.prepare().await?;
        let sent = self.run(source).await?;
        self.post().await?;
        Ok(sent)
    }

    fn expect_state(&self, expected: TaskState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::{BrokerEvent, MemoryBroker};

    fn writer_config() -> WriterConfig {
        WriterConfig {
            service_url: Some("pulsar://x:6650".to_string()),
            topic: Some("t".to_string()),
            column: Some(vec!["a".to_string(), "b".to_string()]),
            key_index: Some(0),
            props: None,
        }
    }

    #[tokio::test]
    async fn test_initialize_opens_connection_then_producer() {
        let broker = MemoryBroker::new();
        let mut task = PublishTask::new(Arc::new(broker.clone()));

        task.initialize(writer_config()).await.unwrap();

        assert_eq!(task.state(), TaskState::Initialized);
        assert_eq!(task.key_index(), Some(0));
        assert_eq!(
            broker.events(),
            vec![
                BrokerEvent::Connect {
                    service_url: "pulsar://x:6650".to_string()
                },
                BrokerEvent::CreateProducer {
                    topic: "t".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_key_index_is_cleared() {
        let mut config = writer_config();
        config.key_index = Some(5);
        let mut task = PublishTask::new(Arc::new(MemoryBroker::new()));

        task.initialize(config).await.unwrap();
        assert_eq!(task.key_index(), None);
    }

    #[tokio::test]
    async fn test_lifecycle_order_is_enforced() {
        let mut task = PublishTask::new(Arc::new(MemoryBroker::new()));

        let err = task.prepare().await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                operation: "prepare",
                state: TaskState::Uninitialized
            }
        ));

        task.initialize(writer_config()).await.unwrap();
        assert!(task.initialize(writer_config()).await.is_err());
        assert!(task.post().await.is_err());
    }

    #[tokio::test]
    async fn test_teardown_without_handles_is_noop() {
        let broker = MemoryBroker::new();
        let mut task = PublishTask::new(Arc::new(broker.clone()));

        task.teardown().await;
        task.teardown().await;

        assert!(broker.events().is_empty());
        assert_eq!(task.state(), TaskState::Uninitialized);
    }

    #[tokio::test]
    async fn test_producer_failure_still_closes_connection() {
        let broker = MemoryBroker::new().fail_create_producer();
        let mut task = PublishTask::new(Arc::new(broker.clone()));

        let err = task.initialize(writer_config()).await.unwrap_err();
        assert!(matches!(err, Error::ProducerCreation { .. }));
        assert_eq!(task.state(), TaskState::Failed);

        task.teardown().await;
        assert_eq!(broker.events().last(), Some(&BrokerEvent::CloseConnection));
    }
}
