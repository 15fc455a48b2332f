use super::{BrokerError, BrokerResult, Connection, Connector, Producer};
use crate::config::Properties;
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to Kafka. The service URL is `kafka://host:port[,host:port...]`.
#[derive(Debug, Default, Clone)]
pub struct KafkaConnector;

#[async_trait]
impl Connector for KafkaConnector {
    async fn connect(&self, service_url: &str, props: &Properties) -> BrokerResult<Box<dyn Connection>> {
        let client_config = client_config(service_url, props)?;
        info!(
            "Prepared Kafka client for {}",
            client_config.get("bootstrap.servers").unwrap_or_default()
        );

        Ok(Box::new(KafkaConnection {
            client_config: Some(client_config),
        }))
    }
}

fn client_config(service_url: &str, props: &Properties) -> BrokerResult<ClientConfig> {
    let brokers = service_url
        .strip_prefix("kafka://")
        .unwrap_or(service_url)
        .trim_end_matches('/');

    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", brokers)
        .set("acks", "all")
        .set("linger.ms", "0");

    for (key, value) in props {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(BrokerError::InvalidProperty {
                    key: key.clone(),
                    message: format!("expected a scalar, got {}", other),
                })
            }
        };
        config.set(key.as_str(), value);
    }

    Ok(config)
}

pub struct KafkaConnection {
    client_config: Option<ClientConfig>,
}

#[async_trait]
impl Connection for KafkaConnection {
    async fn create_producer(&mut self, topic: &str) -> BrokerResult<Box<dyn Producer>> {
        let producer: FutureProducer = self
            .client_config
            .as_ref()
            .ok_or(BrokerError::Closed("Kafka client"))?
            .create()?;
        info!("Created Kafka producer for topic {}", topic);

        Ok(Box::new(KafkaProducer {
            producer,
            topic: topic.to_string(),
        }))
    }

    async fn close(&mut self) -> BrokerResult<()> {
        self.client_config = None;
        Ok(())
    }
}

pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(&mut self, key: Option<&str>, payload: &str) -> BrokerResult<()> {
        let mut record: FutureRecord<'_, str, str> = FutureRecord::to(&self.topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(record, Timeout::Never)
            .await
            .map_err(|(e, _)| BrokerError::Kafka(e))?;
        debug!("Kafka acknowledged message at {}:{}", partition, offset);

        Ok(())
    }

    async fn close(&mut self) -> BrokerResult<()> {
        self.producer.flush(Timeout::After(FLUSH_TIMEOUT))?;
        Ok(())
    }
}
