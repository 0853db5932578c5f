//! Column conversions keyed by command name.
//!
//! A converter adds a typed second column next to the raw `RESULTS` column.
//! Conversions run when a cell is read, so conversions relative to "now"
//! observe the instant of access rather than the instant of dispatch.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Type tag carried by every result column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Timestamp,
}

impl ColumnType {
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::Text => "String",
            ColumnType::Timestamp => "Timestamp",
        }
    }
}

/// A typed cell value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Text(_) => ColumnType::Text,
            Value::Timestamp(_) => ColumnType::Timestamp,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// Rendering used when a timestamp column is read as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Replies of the TTL family that mean "no expiry" (-1) or "no such key" (-2).
const EXPIRY_SENTINELS: [i64; 2] = [-1, -2];

/// Caller-supplied conversion. Receives the cell and the command arguments.
pub type CustomConversion = fn(&str, &[String]) -> std::result::Result<Option<Value>, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimeUnit {
    Seconds,
    Millis,
}

impl TimeUnit {
    fn to_millis(self, amount: i64) -> Option<i64> {
        match self {
            TimeUnit::Seconds => amount.checked_mul(1000),
            TimeUnit::Millis => Some(amount),
        }
    }
}

/// How a cell becomes a typed value.
#[derive(Clone, Copy)]
pub enum Conversion {
    /// Remaining seconds, offset from the current instant.
    RelativeSeconds,
    /// Remaining milliseconds, offset from the current instant.
    RelativeMillis,
    /// Absolute expiry in seconds since the Unix epoch.
    AbsoluteSeconds,
    /// Absolute expiry in milliseconds since the Unix epoch.
    AbsoluteMillis,
    Custom(CustomConversion),
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::RelativeSeconds => f.write_str("RelativeSeconds"),
            Conversion::RelativeMillis => f.write_str("RelativeMillis"),
            Conversion::AbsoluteSeconds => f.write_str("AbsoluteSeconds"),
            Conversion::AbsoluteMillis => f.write_str("AbsoluteMillis"),
            Conversion::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl Conversion {
    /// Converts `cell` using the current wall-clock instant.
    pub fn apply(&self, cell: &str, args: &[String]) -> Result<Option<Value>> {
        self.apply_at(cell, args, Utc::now())
    }

    /// Converts `cell` as if the current instant were `now`.
    pub fn apply_at(
        &self,
        cell: &str,
        args: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<Value>> {
        let timestamp = match self {
            Conversion::RelativeSeconds => {
                offset_timestamp(cell, now.timestamp_millis(), TimeUnit::Seconds)?
            }
            Conversion::RelativeMillis => {
                offset_timestamp(cell, now.timestamp_millis(), TimeUnit::Millis)?
            }
            Conversion::AbsoluteSeconds => offset_timestamp(cell, 0, TimeUnit::Seconds)?,
            Conversion::AbsoluteMillis => offset_timestamp(cell, 0, TimeUnit::Millis)?,
            Conversion::Custom(convert) => {
                return convert(cell, args)
                    .map_err(|message| Error::conversion(cell, "value", message));
            }
        };
        Ok(timestamp.map(Value::Timestamp))
    }
}

/// Adds `cell` units to `base_millis` and truncates to whole seconds. The
/// expiry sentinels convert to `None`.
fn offset_timestamp(
    cell: &str,
    base_millis: i64,
    unit: TimeUnit,
) -> Result<Option<DateTime<Utc>>> {
    let amount: i64 = cell
        .trim()
        .parse()
        .map_err(|err| Error::conversion(cell, "timestamp", err))?;
    if EXPIRY_SENTINELS.contains(&amount) {
        return Ok(None);
    }
    let millis = unit
        .to_millis(amount)
        .and_then(|offset| base_millis.checked_add(offset))
        .ok_or_else(|| Error::conversion(cell, "timestamp", "offset out of range"))?;
    let truncated = millis.div_euclid(1000) * 1000;
    DateTime::from_timestamp_millis(truncated)
        .map(Some)
        .ok_or_else(|| Error::conversion(cell, "timestamp", "instant out of range"))
}

/// A command-specific typed column.
#[derive(Clone, Debug)]
pub struct ColumnConverter {
    pub command: String,
    pub label: String,
    pub column_type: ColumnType,
    pub conversion: Conversion,
}

impl ColumnConverter {
    pub fn new(
        command: &str,
        label: &str,
        column_type: ColumnType,
        conversion: Conversion,
    ) -> Self {
        Self {
            command: command.to_ascii_uppercase(),
            label: label.to_ascii_uppercase(),
            column_type,
            conversion,
        }
    }

    fn timestamp(command: &str, conversion: Conversion) -> Self {
        Self::new(command, "TIMESTAMP", ColumnType::Timestamp, conversion)
    }

    pub fn apply(&self, cell: &str, args: &[String]) -> Result<Option<Value>> {
        self.conversion.apply(cell, args)
    }
}

/// Command name to converter lookup.
#[derive(Clone, Debug)]
pub struct ConverterRegistry {
    converters: HashMap<String, ColumnConverter>,
}

impl ConverterRegistry {
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// The TTL family: `TTL`, `PTTL`, `EXPIRETIME`, `PEXPIRETIME`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(ColumnConverter::timestamp("TTL", Conversion::RelativeSeconds));
        registry.register(ColumnConverter::timestamp("PTTL", Conversion::RelativeMillis));
        // Redis replies to EXPIRETIME in seconds since the epoch, not millis.
        registry.register(ColumnConverter::timestamp("EXPIRETIME", Conversion::AbsoluteSeconds));
        registry.register(ColumnConverter::timestamp("PEXPIRETIME", Conversion::AbsoluteMillis));
        registry
    }

    /// Registers (or replaces) the converter for `converter.command`.
    pub fn register(&mut self, converter: ColumnConverter) {
        self.converters.insert(converter.command.clone(), converter);
    }

    pub fn lookup(&self, command: &str) -> Option<&ColumnConverter> {
        self.converters.get(&command.to_ascii_uppercase())
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
