use async_trait::async_trait;
use record_publisher::source::RecordSource;
use record_publisher::{Column, Record, WriterConfig};
use std::collections::VecDeque;

/// Writer parameters used across the integration tests.
pub fn get_test_config() -> WriterConfig {
    WriterConfig::from_json(
        r#"{
            "serviceUrl": "pulsar://x:6650",
            "topic": "t",
            "column": ["a", "b"],
            "keyIndex": 0
        }"#,
    )
    .unwrap()
}

pub fn record(values: &[Option<&str>]) -> Record {
    Record::new(
        values
            .iter()
            .map(|value| value.map_or(Column::Null, Column::from))
            .collect(),
    )
}

/// In-order record source that counts how many records were pulled.
pub struct CountingSource {
    records: VecDeque<Record>,
    pub pulled: usize,
}

impl CountingSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
            pulled: 0,
        }
    }
}

#[async_trait]
impl RecordSource for CountingSource {
    async fn next_record(&mut self) -> record_publisher::Result<Option<Record>> {
        let next = self.records.pop_front();
        if next.is_some() {
            self.pulled += 1;
        }
        Ok(next)
    }
}
