use super::{find_prop, BrokerError, BrokerResult, Connection, Connector, Producer};
use crate::config::Properties;
use ::pulsar::producer::{Message, ProducerOptions};
use ::pulsar::proto::{schema, Schema};
use ::pulsar::{
    Authentication, ConnectionRetryOptions, OperationRetryOptions, Pulsar, TokioExecutor,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub const PROP_AUTH_TOKEN: &str = "authToken";
pub const PROP_CONNECTION_TIMEOUT_MS: &str = "connectionTimeoutMs";
pub const PROP_OPERATION_TIMEOUT_MS: &str = "operationTimeoutMs";

const KNOWN_PROPS: [&str; 3] = [
    PROP_AUTH_TOKEN,
    PROP_CONNECTION_TIMEOUT_MS,
    PROP_OPERATION_TIMEOUT_MS,
];

/// Connects to Apache Pulsar through the native binary protocol.
#[derive(Debug, Default, Clone)]
pub struct PulsarConnector;

#[async_trait]
impl Connector for PulsarConnector {
    async fn connect(&self, service_url: &str, props: &Properties) -> BrokerResult<Box<dyn Connection>> {
        let mut builder = Pulsar::builder(service_url, TokioExecutor);

        if let Some(token) = find_prop(props, PROP_AUTH_TOKEN) {
            let token = token.as_str().ok_or_else(|| BrokerError::InvalidProperty {
                key: PROP_AUTH_TOKEN.to_string(),
                message: "expected a string".to_string(),
            })?;
            builder = builder.with_auth(Authentication {
                name: "token".to_string(),
                data: token.as_bytes().to_vec(),
            });
        }

        if let Some(timeout) = millis_prop(props, PROP_CONNECTION_TIMEOUT_MS)? {
            builder = builder.with_connection_retry_options(ConnectionRetryOptions {
                connection_timeout: timeout,
                ..Default::default()
            });
        }

        if let Some(timeout) = millis_prop(props, PROP_OPERATION_TIMEOUT_MS)? {
            builder = builder.with_operation_retry_options(OperationRetryOptions {
                operation_timeout: timeout,
                ..Default::default()
            });
        }

        for key in props.keys() {
            if !KNOWN_PROPS.iter().any(|known| known.eq_ignore_ascii_case(key)) {
                debug!("Ignoring unsupported Pulsar client property '{}'", key);
            }
        }

        let client = builder.build().await?;
        info!("Connected to Pulsar at {}", service_url);

        Ok(Box::new(PulsarConnection {
            client: Some(client),
        }))
    }
}

fn millis_prop(props: &Properties, key: &str) -> BrokerResult<Option<Duration>> {
    match find_prop(props, key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .map(|ms| Some(Duration::from_millis(ms)))
            .ok_or_else(|| BrokerError::InvalidProperty {
                key: key.to_string(),
                message: format!("expected milliseconds, got {}", value),
            }),
    }
}

pub struct PulsarConnection {
    client: Option<Pulsar<TokioExecutor>>,
}

#[async_trait]
impl Connection for PulsarConnection {
    async fn create_producer(&mut self, topic: &str) -> BrokerResult<Box<dyn Producer>> {
        let client = self
            .client
            .as_ref()
            .ok_or(BrokerError::Closed("Pulsar client"))?;

        let options = ProducerOptions {
            schema: Some(Schema {
                r#type: schema::Type::String as i32,
                ..Default::default()
            }),
            ..Default::default()
        };

        let producer = client
            .producer()
            .with_topic(topic)
            .with_options(options)
            .build()
            .await?;
        info!("Created Pulsar producer for topic {}", topic);

        Ok(Box::new(PulsarProducer { producer }))
    }

    async fn close(&mut self) -> BrokerResult<()> {
        // The client has no explicit close; dropping it shuts down its
        // connection pool.
        if self.client.take().is_some() {
            debug!("Pulsar client released");
        }
        Ok(())
    }
}

pub struct PulsarProducer {
    producer: ::pulsar::Producer<TokioExecutor>,
}

#[async_trait]
impl Producer for PulsarProducer {
    async fn send(&mut self, key: Option<&str>, payload: &str) -> BrokerResult<()> {
        let message = Message {
            payload: payload.as_bytes().to_vec(),
            partition_key: key.map(str::to_string),
            ..Default::default()
        };

        let receipt = self.producer.send_non_blocking(message).await?.await?;
        debug!(
            "Pulsar acknowledged message, sequence_id: {}",
            receipt.sequence_id
        );
        Ok(())
    }

    async fn close(&mut self) -> BrokerResult<()> {
        self.producer.close().await?;
        Ok(())
    }
}
