use crate::record::Record;
use crate::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tracing::debug;

/// Pull side of the upstream pipeline.
///
/// `Ok(None)` marks the end of the stream; it is not an error.
#[async_trait]
pub trait RecordSource: Send {
    async fn next_record(&mut self) -> Result<Option<Record>>;
}

#[async_trait]
impl RecordSource for mpsc::Receiver<Record> {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.recv().await)
    }
}

/// Reads one JSON array per line, skipping blank lines.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_number: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> RecordSource for JsonLinesSource<R> {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Record::from_json_line(&line).map(Some).map_err(|e| {
                crate::Error::Source(format!("line {}: {}", self.line_number, e))
            });
        }

        debug!("Record stream exhausted after {} lines", self.line_number);
        Ok(None)
    }
}

/// Spreads the records of `source` round-robin over `senders` and returns
/// how many were forwarded. Stops early once any receiver is gone, since a
/// closed channel means its task already failed.
pub async fn fan_out<S>(source: &mut S, senders: Vec<mpsc::Sender<Record>>) -> Result<u64>
where
    S: RecordSource + ?Sized,
{
    if senders.is_empty() {
        return Ok(0);
    }

    let mut forwarded = 0;
    let mut next = 0;
    while let Some(record) = source.next_record().await? {
        if senders[next].send(record).await.is_err() {
            debug!("Receiver {} closed, stop reading records", next);
            break;
        }
        forwarded += 1;
        next = (next + 1) % senders.len();
    }
    Ok(forwarded)
}
