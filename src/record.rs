use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single typed value within a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Null,
    String(String),
    Long(i64),
    Double(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl Column {
    /// Canonical string rendering, `None` for a null column.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Column::Null => None,
            Column::String(s) => Some(s.clone()),
            Column::Long(n) => Some(n.to_string()),
            Column::Double(n) => Some(decimal_string(*n)),
            Column::Bool(b) => Some(b.to_string()),
            Column::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Column::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// The underlying value with its original type preserved, as used for
    /// partition keys. Dates become epoch milliseconds, bytes become base64,
    /// doubles stay the decimal string they are stored as upstream.
    pub fn raw_value(&self) -> Value {
        match self {
            Column::Null => Value::Null,
            Column::String(s) => Value::String(s.clone()),
            Column::Long(n) => Value::from(*n),
            Column::Double(n) => Value::String(decimal_string(*n)),
            Column::Bool(b) => Value::Bool(*b),
            Column::Date(d) => Value::from(d.timestamp_millis()),
            Column::Bytes(b) => Value::String(BASE64.encode(b)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Column::Null)
    }
}

/// Plain decimal rendering that always keeps a fractional part below 1e7,
/// so `1.0` stays `"1.0"` rather than `"1"`.
fn decimal_string(n: f64) -> String {
    let rendered = n.to_string();
    if n.is_finite() && n.abs() < 1e7 && !rendered.contains('.') {
        format!("{}.0", rendered)
    } else {
        rendered
    }
}

impl From<Value> for Column {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Column::Null,
            Value::Bool(b) => Column::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(n) => Column::Long(n),
                None => Column::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Column::String(s),
            other => Column::String(other.to_string()),
        }
    }
}

impl From<&str> for Column {
    fn from(value: &str) -> Self {
        Column::String(value.to_string())
    }
}

impl From<i64> for Column {
    fn from(value: i64) -> Self {
        Column::Long(value)
    }
}

/// One row produced by the upstream pipeline. Columns are read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<Column>,
}

impl Record {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Builds a record from a JSON array line such as `["k1", null, 3]`.
    pub fn from_json_line(line: &str) -> crate::Result<Self> {
        match serde_json::from_str::<Value>(line)? {
            Value::Array(values) => Ok(Self::new(values.into_iter().map(Column::from).collect())),
            other => Err(crate::Error::Source(format!(
                "expected a JSON array per record, got: {}",
                other
            ))),
        }
    }
}

impl From<Vec<Column>> for Record {
    fn from(columns: Vec<Column>) -> Self {
        Self::new(columns)
    }
}
