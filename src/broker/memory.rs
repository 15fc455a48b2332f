//! In-process broker used for dry runs and tests.
//!
//! [`MemoryBroker`] is a cheap handle over shared state: clone it, hand one
//! clone to a task as its connector and inspect the other afterwards.
//! Failures can be injected at every step of the producer lifecycle.

use super::{BrokerError, BrokerResult, Connection, Connector, Producer};
use crate::config::Properties;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A message accepted by the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: String,
}

/// Every call the broker received, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Connect { service_url: String },
    CreateProducer { topic: String },
    Send { topic: String, key: Option<String> },
    CloseProducer { topic: String },
    CloseConnection,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<BrokerEvent>,
    messages: Vec<PublishedMessage>,
    last_props: Option<Properties>,
    fail_connect: bool,
    fail_create_producer: bool,
    fail_send_at: Option<usize>,
    fail_close: bool,
    send_attempts: usize,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `connect` call fail.
    pub fn fail_connect(self) -> Self {
        self.lock().fail_connect = true;
        self
    }

    pub fn fail_create_producer(self) -> Self {
        self.lock().fail_create_producer = true;
        self
    }

    /// Fails the send attempt with the given zero-based position.
    pub fn fail_send_at(self, attempt: usize) -> Self {
        self.lock().fail_send_at = Some(attempt);
        self
    }

    /// Makes both producer and connection close report an error.
    pub fn fail_close(self) -> Self {
        self.lock().fail_close = true;
        self
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.lock().messages.clone()
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.lock().events.clone()
    }

    pub fn last_props(&self) -> Option<Properties> {
        self.lock().last_props.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked mid-call; the
        // recorded state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, service_url: &str, props: &Properties) -> BrokerResult<Box<dyn Connection>> {
        let mut state = self.lock();
        state.events.push(BrokerEvent::Connect {
            service_url: service_url.to_string(),
        });
        state.last_props = Some(props.clone());
        if state.fail_connect {
            return Err(BrokerError::Memory(format!("connection refused: {}", service_url)));
        }

        Ok(Box::new(MemoryConnection {
            broker: self.clone(),
        }))
    }
}

struct MemoryConnection {
    broker: MemoryBroker,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn create_producer(&mut self, topic: &str) -> BrokerResult<Box<dyn Producer>> {
        let mut state = self.broker.lock();
        state.events.push(BrokerEvent::CreateProducer {
            topic: topic.to_string(),
        });
        if state.fail_create_producer {
            return Err(BrokerError::Memory(format!("topic not found: {}", topic)));
        }

        Ok(Box::new(MemoryProducer {
            broker: self.broker.clone(),
            topic: topic.to_string(),
        }))
    }

    async fn close(&mut self) -> BrokerResult<()> {
        let mut state = self.broker.lock();
        state.events.push(BrokerEvent::CloseConnection);
        if state.fail_close {
            return Err(BrokerError::Memory("connection close failed".to_string()));
        }
        Ok(())
    }
}

struct MemoryProducer {
    broker: MemoryBroker,
    topic: String,
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn send(&mut self, key: Option<&str>, payload: &str) -> BrokerResult<()> {
        let mut state = self.broker.lock();
        state.events.push(BrokerEvent::Send {
            topic: self.topic.clone(),
            key: key.map(str::to_string),
        });

        let attempt = state.send_attempts;
        state.send_attempts += 1;
        if state.fail_send_at == Some(attempt) {
            return Err(BrokerError::Memory(format!("send #{} rejected", attempt)));
        }

        debug!("Accepted in-memory message #{} on {}", attempt, self.topic);
        state.messages.push(PublishedMessage {
            topic: self.topic.clone(),
            key: key.map(str::to_string),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn close(&mut self) -> BrokerResult<()> {
        let mut state = self.broker.lock();
        state.events.push(BrokerEvent::CloseProducer {
            topic: self.topic.clone(),
        });
        if state.fail_close {
            return Err(BrokerError::Memory("producer close failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_lifecycle() {
        let broker = MemoryBroker::new();
        let mut connection = broker.connect("memory://", &Properties::new()).await.unwrap();
        let mut producer = connection.create_producer("t").await.unwrap();

        producer.send(Some("k"), "{}").await.unwrap();
        producer.close().await.unwrap();
        connection.close().await.unwrap();

        assert_eq!(
            broker.messages(),
            vec![PublishedMessage {
                topic: "t".to_string(),
                key: Some("k".to_string()),
                payload: "{}".to_string(),
            }]
        );
        assert_eq!(
            broker.events(),
            vec![
                BrokerEvent::Connect {
                    service_url: "memory://".to_string()
                },
                BrokerEvent::CreateProducer {
                    topic: "t".to_string()
                },
                BrokerEvent::Send {
                    topic: "t".to_string(),
                    key: Some("k".to_string())
                },
                BrokerEvent::CloseProducer {
                    topic: "t".to_string()
                },
                BrokerEvent::CloseConnection,
            ]
        );
    }

    #[tokio::test]
    async fn test_send_failure_injection() {
        let broker = MemoryBroker::new().fail_send_at(1);
        let mut connection = broker.connect("memory://", &Properties::new()).await.unwrap();
        let mut producer = connection.create_producer("t").await.unwrap();

        assert!(producer.send(None, "1").await.is_ok());
        assert!(producer.send(None, "2").await.is_err());
        assert!(producer.send(None, "3").await.is_ok());
        assert_eq!(broker.messages().len(), 2);
    }
}
