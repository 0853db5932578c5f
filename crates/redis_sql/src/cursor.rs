//! Forward-only tabular cursor over decoded cells.
//!
//! Two shapes exist. A single-column cursor walks the flat decoded sequence;
//! when a converter applies, it exposes the same cell a second time through
//! the converter. A two-column cursor walks parallel key and value columns
//! produced by a hash projection.
//!
//! Position starts at -1 (before the first row), moves forward one row per
//! [`Cursor::advance`], and stops at the row count (after the last row).
//! Closing is terminal and idempotent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::convert::{ColumnConverter, ColumnType, Value};
use crate::decode::Cell;
use crate::error::{Error, Result};
use crate::hash::HashProjection;

/// Label of the raw result column.
pub const RESULTS_LABEL: &str = "RESULTS";
/// Labels of the two hash projection columns.
pub const KEY_LABEL: &str = "KEY";
pub const VALUE_LABEL: &str = "VALUE";

/// How a column turns its cell into a value, fixed at cursor construction.
#[derive(Clone, Debug)]
pub enum ColumnKind {
    Text,
    Converted(ColumnConverter),
}

#[derive(Clone, Debug)]
pub struct Column {
    label: String,
    kind: ColumnKind,
}

impl Column {
    fn text(label: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: ColumnKind::Text,
        }
    }

    fn converted(converter: ColumnConverter) -> Self {
        Self {
            label: converter.label.clone(),
            kind: ColumnKind::Converted(converter),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn column_type(&self) -> ColumnType {
        match &self.kind {
            ColumnKind::Text => ColumnType::Text,
            ColumnKind::Converted(converter) => converter.column_type,
        }
    }
}

/// Describes the columns of a cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorMetadata {
    columns: Vec<ColumnMetadata>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub label: String,
    pub column_type: ColumnType,
}

impl CursorMetadata {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    fn column(&self, index: usize) -> Result<&ColumnMetadata> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or(Error::InvalidColumn(index))
    }

    pub fn column_label(&self, index: usize) -> Result<&str> {
        Ok(&self.column(index)?.label)
    }

    pub fn column_type(&self, index: usize) -> Result<ColumnType> {
        Ok(self.column(index)?.column_type)
    }

    pub fn column_type_name(&self, index: usize) -> Result<&'static str> {
        Ok(self.column(index)?.column_type.type_name())
    }

    /// Result columns never accept writes.
    pub fn is_read_only(&self, index: usize) -> Result<bool> {
        self.column(index).map(|_| true)
    }

    pub fn is_auto_increment(&self, index: usize) -> Result<bool> {
        self.column(index).map(|_| false)
    }
}

/// A column addressed either by 1-based index or by label.
pub trait ColumnIndex: fmt::Display {
    #[doc(hidden)]
    fn resolve(&self, columns: &[Column]) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, columns: &[Column]) -> Result<usize> {
        if *self >= 1 && *self <= columns.len() {
            Ok(*self)
        } else {
            Err(Error::InvalidColumn(*self))
        }
    }
}

impl ColumnIndex for str {
    fn resolve(&self, columns: &[Column]) -> Result<usize> {
        columns
            .iter()
            .position(|column| column.label.eq_ignore_ascii_case(self))
            .map(|i| i + 1)
            .ok_or_else(|| Error::UnknownColumn(self.to_string()))
    }
}

impl<T: ?Sized + ColumnIndex> ColumnIndex for &T {
    fn resolve(&self, columns: &[Column]) -> Result<usize> {
        T::resolve(*self, columns)
    }
}

/// Cursor movements. Only `Next` is supported by a forward-only cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Positioning {
    Next,
    Previous,
    First,
    Last,
    BeforeFirst,
    AfterLast,
    Absolute(i64),
    Relative(i64),
}

#[derive(Debug)]
enum Rows {
    Single(Vec<Cell>),
    Pairs { keys: Vec<Cell>, values: Vec<Cell> },
}

impl Rows {
    fn len(&self) -> usize {
        match self {
            Rows::Single(cells) => cells.len(),
            Rows::Pairs { keys, .. } => keys.len(),
        }
    }
}

/// Forward-only row walker over one statement's result.
#[derive(Debug)]
pub struct Cursor {
    rows: Rows,
    columns: Vec<Column>,
    args: Vec<String>,
    position: i64,
    closed: bool,
    last_read_null: bool,
}

impl Cursor {
    /// Single-column cursor, plus a converted second column when
    /// `converter` is given.
    pub fn single(cells: Vec<Cell>, args: Vec<String>, converter: Option<ColumnConverter>) -> Self {
        let mut columns = vec![Column::text(RESULTS_LABEL)];
        columns.extend(converter.map(Column::converted));
        Self::with_rows(Rows::Single(cells), columns, args)
    }

    /// Two-column `KEY`/`VALUE` cursor. Fails when the columns differ in length.
    pub fn pairs(keys: Vec<Cell>, values: Vec<Cell>) -> Result<Self> {
        if keys.len() != values.len() {
            return Err(Error::InvalidRowSet(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        let columns = vec![Column::text(KEY_LABEL), Column::text(VALUE_LABEL)];
        Ok(Self::with_rows(Rows::Pairs { keys, values }, columns, Vec::new()))
    }

    /// Applies `projection` to `cells` and wraps the result.
    pub fn projected(projection: HashProjection, cells: Vec<Cell>, args: &[String]) -> Result<Self> {
        let (keys, values) = projection.project(cells, args)?;
        Self::pairs(keys, values)
    }

    fn with_rows(rows: Rows, columns: Vec<Column>, args: Vec<String>) -> Self {
        Self {
            rows,
            columns,
            args,
            position: -1,
            closed: false,
            last_read_null: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("cursor"));
        }
        Ok(())
    }

    /// Moves forward one row; returns whether a row is now available.
    pub fn advance(&mut self) -> Result<bool> {
        self.check_open()?;
        let row_count = self.row_count() as i64;
        if self.position < row_count {
            self.position += 1;
        }
        Ok(self.position < row_count)
    }

    pub fn seek(&mut self, positioning: Positioning) -> Result<bool> {
        self.check_open()?;
        match positioning {
            Positioning::Next => self.advance(),
            other => Err(Error::Unsupported(format!(
                "{other:?} on a forward-only cursor"
            ))),
        }
    }

    /// Cursors are read-only.
    pub fn update<I: ColumnIndex>(&mut self, column: I, _value: Option<&str>) -> Result<()> {
        self.check_open()?;
        Err(Error::Unsupported(format!("update of column {column}")))
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_before_first(&self) -> bool {
        self.position == -1
    }

    pub fn is_after_last(&self) -> bool {
        self.position == self.row_count() as i64
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if !self.closed {
            debug!(rows = self.row_count(), "cursor closed");
        }
        self.closed = true;
    }

    pub fn metadata(&self) -> Result<CursorMetadata> {
        self.check_open()?;
        Ok(CursorMetadata {
            columns: self
                .columns
                .iter()
                .map(|column| ColumnMetadata {
                    label: column.label.clone(),
                    column_type: column.column_type(),
                })
                .collect(),
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// 1-based index of the column with `label` (case-insensitive).
    pub fn find_column(&self, label: &str) -> Result<usize> {
        self.check_open()?;
        label.resolve(&self.columns)
    }

    /// Whether the most recently read cell was null.
    pub fn was_null(&self) -> Result<bool> {
        self.check_open()?;
        Ok(self.last_read_null)
    }

    fn current_row(&self) -> Result<usize> {
        if self.position >= 0 && self.position < self.row_count() as i64 {
            Ok(self.position as usize)
        } else {
            Err(Error::NoCurrentRow(self.position))
        }
    }

    fn cell(&self, index: usize) -> Result<&Cell> {
        let row = self.current_row()?;
        let cell = match &self.rows {
            Rows::Single(cells) => &cells[row],
            Rows::Pairs { keys, values } => {
                if index == 1 {
                    &keys[row]
                } else {
                    &values[row]
                }
            }
        };
        Ok(cell)
    }

    /// Reads the cell at `column` through the column's conversion.
    pub fn get_value<I: ColumnIndex>(&mut self, column: I) -> Result<Option<Value>> {
        self.check_open()?;
        let index = column.resolve(&self.columns)?;
        let value = match self.cell(index)?.as_text()? {
            None => None,
            Some(text) => match &self.columns[index - 1].kind {
                ColumnKind::Text => Some(Value::Text(text.to_string())),
                ColumnKind::Converted(converter) => converter.apply(text, &self.args)?,
            },
        };
        self.last_read_null = value.is_none();
        Ok(value)
    }

    pub fn get_string<I: ColumnIndex>(&mut self, column: I) -> Result<Option<String>> {
        Ok(self.get_value(column)?.map(|value| match value {
            Value::Text(text) => text,
            timestamp => timestamp.to_string(),
        }))
    }

    pub fn get_bytes<I: ColumnIndex>(&mut self, column: I) -> Result<Option<Vec<u8>>> {
        Ok(self.get_string(column)?.map(String::into_bytes))
    }

    /// `"1"`/`"true"` and `"0"`/`"false"`; null reads as `false`.
    pub fn get_bool<I: ColumnIndex>(&mut self, column: I) -> Result<bool> {
        match self.get_value(column)? {
            None => Ok(false),
            Some(Value::Text(text)) => match text.as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                _ => Err(Error::conversion(&text, "bool", "expected 0, 1, true or false")),
            },
            Some(other) => Err(Error::conversion(&other.to_string(), "bool", "not a boolean column")),
        }
    }

    pub fn get_i16<I: ColumnIndex>(&mut self, column: I) -> Result<i16> {
        self.get_number(column, "i16")
    }

    pub fn get_i32<I: ColumnIndex>(&mut self, column: I) -> Result<i32> {
        self.get_number(column, "i32")
    }

    /// Timestamps read as epoch milliseconds.
    pub fn get_i64<I: ColumnIndex>(&mut self, column: I) -> Result<i64> {
        match self.get_value(column)? {
            Some(Value::Timestamp(ts)) => Ok(ts.timestamp_millis()),
            value => parse_number(value, "i64"),
        }
    }

    pub fn get_f32<I: ColumnIndex>(&mut self, column: I) -> Result<f32> {
        self.get_number(column, "f32")
    }

    pub fn get_f64<I: ColumnIndex>(&mut self, column: I) -> Result<f64> {
        self.get_number(column, "f64")
    }

    /// Only timestamp columns can be read as timestamps.
    pub fn get_timestamp<I: ColumnIndex>(&mut self, column: I) -> Result<Option<DateTime<Utc>>> {
        self.check_open()?;
        let index = column.resolve(&self.columns)?;
        if self.columns[index - 1].column_type() != ColumnType::Timestamp {
            return Err(Error::Unsupported(format!(
                "timestamp read of text column {}",
                self.columns[index - 1].label
            )));
        }
        match self.get_value(index)? {
            None => Ok(None),
            Some(Value::Timestamp(ts)) => Ok(Some(ts)),
            Some(Value::Text(text)) => Err(Error::conversion(&text, "timestamp", "converter produced text")),
        }
    }

    fn get_number<I: ColumnIndex, T>(&mut self, column: I, target: &'static str) -> Result<T>
    where
        T: FromStr + Default,
        T::Err: fmt::Display,
    {
        let value = self.get_value(column)?;
        parse_number(value, target)
    }
}

fn parse_number<T>(value: Option<Value>, target: &'static str) -> Result<T>
where
    T: FromStr + Default,
    T::Err: fmt::Display,
{
    match value {
        None => Ok(T::default()),
        Some(Value::Text(text)) => text
            .trim()
            .parse()
            .map_err(|err| Error::conversion(&text, target, err)),
        Some(other) => Err(Error::conversion(&other.to_string(), target, "not a numeric column")),
    }
}
