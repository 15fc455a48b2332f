mod common;

use common::{get_test_config, record, CountingSource};
use record_publisher::broker::memory::{BrokerEvent, MemoryBroker, PublishedMessage};
use record_publisher::broker::Connector;
use record_publisher::{Error, ErrorKind, PublishTask, TaskState};
use std::sync::Arc;

fn task_for(broker: &MemoryBroker) -> PublishTask {
    let connector: Arc<dyn Connector> = Arc::new(broker.clone());
    PublishTask::new(connector)
}

#[tokio::test]
async fn test_publishes_key_and_explicit_nulls() {
    let broker = MemoryBroker::new();
    let mut task = task_for(&broker);
    let mut source = CountingSource::new(vec![record(&[Some("k1"), None])]);

    let sent = task.execute(get_test_config(), &mut source).await.unwrap();

    assert_eq!(sent, 1);
    assert_eq!(task.state(), TaskState::Stopped);
    assert_eq!(
        broker.messages(),
        vec![PublishedMessage {
            topic: "t".to_string(),
            key: Some("\"k1\"".to_string()),
            payload: r#"{"a":"k1","b":null}"#.to_string(),
        }]
    );
}

#[tokio::test]
async fn test_out_of_range_key_index_sends_without_key() {
    let broker = MemoryBroker::new();
    let mut task = task_for(&broker);
    let mut config = get_test_config();
    config.key_index = Some(5);
    let mut source = CountingSource::new(vec![
        record(&[Some("k1"), None]),
        record(&[Some("k2"), Some("v2")]),
    ]);

    task.execute(config, &mut source).await.unwrap();

    let messages = broker.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.key.is_none()));
    assert_eq!(task.key_index(), None);
}

#[tokio::test]
async fn test_missing_fields_never_connect() {
    for field in ["serviceUrl", "topic", "column"] {
        let broker = MemoryBroker::new();
        let mut task = task_for(&broker);
        let mut config = get_test_config();
        match field {
            "serviceUrl" => config.service_url = None,
            "topic" => config.topic = None,
            _ => config.column = None,
        }

        let err = task.initialize(config).await.unwrap_err();

        assert!(matches!(err, Error::MissingField(name) if name == field));
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(task.state(), TaskState::Failed);
        assert!(broker.events().is_empty());

        task.teardown().await;
        assert!(broker.events().is_empty());
    }
}

#[tokio::test]
async fn test_messages_follow_source_order() {
    let broker = MemoryBroker::new();
    let mut task = task_for(&broker);
    let values: Vec<String> = (0..50).map(|n| format!("r{}", n)).collect();
    let records = values
        .iter()
        .map(|v| record(&[Some(v.as_str()), Some("x")]))
        .collect();
    let mut source = CountingSource::new(records);

    let sent = task.execute(get_test_config(), &mut source).await.unwrap();

    assert_eq!(sent, 50);
    let keys: Vec<String> = broker
        .messages()
        .into_iter()
        .filter_map(|m| m.key)
        .collect();
    let expected: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
    assert_eq!(keys, expected);
}

#[tokio::test]
async fn test_send_failure_stops_pulling() {
    let broker = MemoryBroker::new().fail_send_at(2);
    let mut task = task_for(&broker);
    let mut source = CountingSource::new(vec![
        record(&[Some("1"), None]),
        record(&[Some("2"), None]),
        record(&[Some("3"), None]),
        record(&[Some("4"), None]),
        record(&[Some("5"), None]),
    ]);

    let err = task.execute(get_test_config(), &mut source).await.unwrap_err();

    assert!(matches!(
        &err,
        Error::Send { service_url, topic, .. } if service_url == "pulsar://x:6650" && topic == "t"
    ));
    assert_eq!(err.code(), "PULSAR_CONN_SEND_MESSAGE_ERROR");
    assert_eq!(source.pulled, 3);
    assert_eq!(broker.messages().len(), 2);
    assert_eq!(task.state(), TaskState::Failed);

    // Teardown ran after the failure: producer first, then the connection.
    let events = broker.events();
    assert_eq!(
        &events[events.len() - 2..],
        &[
            BrokerEvent::CloseProducer {
                topic: "t".to_string()
            },
            BrokerEvent::CloseConnection,
        ]
    );
}

#[tokio::test]
async fn test_short_record_aborts_run() {
    let broker = MemoryBroker::new();
    let mut task = task_for(&broker);
    let mut source = CountingSource::new(vec![
        record(&[Some("ok"), Some("ok")]),
        record(&[Some("short")]),
        record(&[Some("never"), Some("sent")]),
    ]);

    let err = task.execute(get_test_config(), &mut source).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Encoding);
    assert_eq!(source.pulled, 2);
    assert_eq!(broker.messages().len(), 1);
}

#[tokio::test]
async fn test_connect_failure_is_client_creation_error() {
    let broker = MemoryBroker::new().fail_connect();
    let mut task = task_for(&broker);
    let mut source = CountingSource::new(vec![record(&[Some("k1"), None])]);

    let err = task.execute(get_test_config(), &mut source).await.unwrap_err();

    assert!(matches!(&err, Error::ClientCreation { service_url, .. } if service_url == "pulsar://x:6650"));
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(source.pulled, 0);
    assert_eq!(
        broker.events(),
        vec![BrokerEvent::Connect {
            service_url: "pulsar://x:6650".to_string()
        }]
    );
}

#[tokio::test]
async fn test_teardown_swallows_close_failures() {
    let broker = MemoryBroker::new().fail_close();
    let mut task = task_for(&broker);
    let mut source = CountingSource::new(vec![record(&[Some("k1"), None])]);

    let sent = task.execute(get_test_config(), &mut source).await.unwrap();
    assert_eq!(sent, 1);

    let events = broker.events();
    assert!(events.contains(&BrokerEvent::CloseProducer {
        topic: "t".to_string()
    }));
    assert_eq!(events.last(), Some(&BrokerEvent::CloseConnection));

    // Handles are released once; a second teardown touches nothing.
    task.teardown().await;
    assert_eq!(broker.events().len(), events.len());
}

#[tokio::test]
async fn test_props_are_passed_to_connector() {
    let broker = MemoryBroker::new();
    let mut task = task_for(&broker);
    let mut config = get_test_config();
    config.props = serde_json::json!({"operationTimeoutMs": 3000})
        .as_object()
        .cloned();

    task.initialize(config).await.unwrap();

    let props = broker.last_props().unwrap();
    assert_eq!(props["operationTimeoutMs"], 3000);
    task.teardown().await;
}
