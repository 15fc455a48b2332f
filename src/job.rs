use crate::broker::Connector;
use crate::config::WriterConfig;
use crate::source::RecordSource;
use crate::task::PublishTask;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Job-level side of the writer: validates the parameters once and fans
/// them out to parallel [`PublishTask`]s.
#[derive(Debug, Clone)]
pub struct PublishJob {
    config: WriterConfig,
}

impl PublishJob {
    /// Fails fast on missing `serviceUrl`, `topic` or `column` before any
    /// task is created.
    pub fn init(config: WriterConfig) -> Result<Self> {
        debug!("Writer job config: {:?}", config);
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// One identical configuration per task.
    pub fn split(&self, parallelism: usize) -> Vec<WriterConfig> {
        vec![self.config.clone(); parallelism]
    }

    /// Runs one task per source concurrently. Tasks share nothing; every
    /// task is torn down on its own. Returns the total number of messages
    /// sent, or the first task error.
    pub async fn run<S>(&self, connector: Arc<dyn Connector>, sources: Vec<S>) -> Result<u64>
    where
        S: RecordSource + 'static,
    {
        let configs = self.split(sources.len());
        let mut tasks = JoinSet::new();

        for (id, (config, mut source)) in configs.into_iter().zip(sources).enumerate() {
            let connector = connector.clone();
            tasks.spawn(async move {
                let mut task = PublishTask::new(connector);
                let result = task.execute(config, &mut source).await;
                (id, result)
            });
        }
        info!("Started {} publish tasks", tasks.len());

        let mut total = 0;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(sent))) => {
                    debug!("Publish task {} sent {} messages", id, sent);
                    total += sent;
                }
                Ok((id, Err(e))) => {
                    error!(code = e.code(), "Publish task {} failed: {}", id, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    error!("Publish task panicked: {}", e);
                    if first_error.is_none() {
                        first_error = Some(Error::Source(format!("publish task panicked: {}", e)));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }
}
