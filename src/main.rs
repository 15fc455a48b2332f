use anyhow::Context;
use clap::Parser;
use record_publisher::broker::{Connector, DefaultConnector, MemoryBroker};
use record_publisher::logging::{self, LogFormat};
use record_publisher::source::{fan_out, JsonLinesSource};
use record_publisher::{PublishJob, Record, WriterConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "record-publisher")]
#[command(about = "Publishes JSON-array records from stdin to a Pulsar or Kafka topic", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "publisher.json")]
    config: PathBuf,

    #[arg(long, default_value_t = 1, help = "Number of parallel publish tasks")]
    channel: usize,

    #[arg(long, help = "Publish to an in-memory broker instead of the configured one")]
    dry_run: bool,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(args));
    // stdin is read on a blocking thread that cannot be interrupted; don't
    // let a stalled pipe hold the process after the job is done.
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    logging::init(format, args.verbose)?;

    info!("Loading configuration from {:?}", args.config);
    let config = WriterConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let job = PublishJob::init(config)?;

    info!(
        service_url = ?job.config().service_url,
        topic = ?job.config().topic,
        columns = ?job.config().column,
        key_index = ?job.config().key_index,
        channel = args.channel,
        "Configuration summary"
    );

    let connector: Arc<dyn Connector> = if args.dry_run {
        Arc::new(MemoryBroker::new())
    } else {
        Arc::new(DefaultConnector::new())
    };

    let parallelism = args.channel.max(1);
    let mut senders = Vec::with_capacity(parallelism);
    let mut receivers = Vec::with_capacity(parallelism);
    for _ in 0..parallelism {
        let (tx, rx) = mpsc::channel::<Record>(CHANNEL_CAPACITY);
        senders.push(tx);
        receivers.push(rx);
    }

    let reader = tokio::spawn(async move {
        let mut source = JsonLinesSource::new(BufReader::new(tokio::io::stdin()));
        fan_out(&mut source, senders).await
    });

    match job.run(connector, receivers).await {
        Ok(total) => {
            let read = reader.await.context("stdin reader panicked")?;
            let forwarded = read?;
            info!("Published {} of {} records read", total, forwarded);
            Ok(())
        }
        Err(e) => {
            // The reader may sit on a stalled stdin; don't wait for it.
            reader.abort();
            error!(code = e.code(), "Publishing failed: {}", e);
            Err(e.into())
        }
    }
}
