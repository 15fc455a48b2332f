pub mod broker;
pub mod config;
pub mod encoder;
pub mod error;
pub mod job;
pub mod logging;
pub mod record;
pub mod source;
pub mod task;

pub use config::{TaskConfig, WriterConfig};
pub use encoder::{MessageEncoder, OutgoingMessage};
pub use error::{Error, ErrorKind, Result};
pub use job::PublishJob;
pub use record::{Column, Record};
pub use task::{PublishTask, TaskState};
