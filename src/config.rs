use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

pub const PARAMETER_SERVICE_URL: &str = "serviceUrl";
pub const PARAMETER_TOPIC: &str = "topic";
pub const PARAMETER_COLUMN: &str = "column";
pub const PARAMETER_KEY_INDEX: &str = "keyIndex";
pub const PARAMETER_PROPS: &str = "props";

/// Opaque client properties forwarded to the broker connector.
pub type Properties = Map<String, Value>;

/// Writer parameters as handed over by the job configuration.
///
/// Every field is optional at this level; [`WriterConfig::validate`] turns it
/// into a [`TaskConfig`] or names the first missing required field.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WriterConfig {
    #[serde(rename = "serviceUrl", alias = "serviceurl", alias = "service_url", default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(rename = "column", alias = "columns", default)]
    pub column: Option<Vec<String>>,
    #[serde(
        rename = "keyIndex",
        alias = "keyindex",
        alias = "key_index",
        default,
        deserialize_with = "int_or_numeric_string"
    )]
    pub key_index: Option<i64>,
    #[serde(default)]
    pub props: Option<Properties>,
}

/// Validated, immutable configuration of one publish task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub service_url: String,
    pub topic: String,
    pub columns: Vec<String>,
    /// Configured key position. Not yet checked against `columns`, see
    /// [`TaskConfig::effective_key_index`].
    pub key_index: Option<usize>,
    pub extra_props: Properties,
}

impl WriterConfig {
    /// Loads writer parameters from a file (format inferred from the
    /// extension), overridden by `RECORD_PUBLISHER__*` environment variables.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("RECORD_PUBLISHER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks the required parameters in declaration order: `serviceUrl`,
    /// `topic`, then `column`. Empty values count as missing.
    pub fn validate(&self) -> Result<TaskConfig> {
        let service_url = required_str(&self.service_url, PARAMETER_SERVICE_URL)?;
        let topic = required_str(&self.topic, PARAMETER_TOPIC)?;
        let columns = match &self.column {
            Some(columns) if !columns.is_empty() => columns.clone(),
            _ => return Err(Error::MissingField(PARAMETER_COLUMN)),
        };

        // Negative values mean "no key", like the upstream -1 default.
        let key_index = self
            .key_index
            .and_then(|index| usize::try_from(index).ok());

        Ok(TaskConfig {
            service_url,
            topic,
            columns,
            key_index,
            extra_props: self.props.clone().unwrap_or_default(),
        })
    }
}

impl TaskConfig {
    /// The key index the run loop actually uses. An index past the last
    /// column is silently dropped instead of failing validation.
    pub fn effective_key_index(&self) -> Option<usize> {
        self.key_index.filter(|index| *index < self.columns.len())
    }
}

/// Accepts `0` as well as `"0"`; job files written by hand often quote numbers.
fn int_or_numeric_string<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match Option::<IntOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntOrString::Int(n)) => Ok(Some(n)),
        Some(IntOrString::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid keyIndex: {:?}", s))),
    }
}

fn required_str(value: &Option<String>, field: &'static str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(Error::MissingField(field)),
    }
}
