//! Reply decoding: any raw reply becomes an ordered sequence of cells.

use redis_protocol::resp2::types::BytesFrame;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Unprocessed reply from the store, consumed once by [`decode`].
pub type RawReply = BytesFrame;

/// One decoded value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    Null,
    Text(String),
    /// A collection element of an unsupported shape. Reading it fails with
    /// [`Error::Decode`]; the rest of the row set stays usable.
    Undecodable(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Cell contents, or the deferred decode failure.
    pub fn as_text(&self) -> Result<Option<&str>> {
        match self {
            Cell::Null => Ok(None),
            Cell::Text(text) => Ok(Some(text)),
            Cell::Undecodable(shape) => Err(Error::Decode(shape.clone())),
        }
    }
}

impl From<Option<String>> for Cell {
    fn from(value: Option<String>) -> Self {
        value.map_or(Cell::Null, Cell::Text)
    }
}

/// Normalizes a raw reply into cells.
///
/// Null and scalar replies yield exactly one cell. Collections are flattened
/// in pre-order to any depth, so leaves keep the exact order the store sent
/// them in.
pub fn decode(reply: RawReply) -> Vec<Cell> {
    let cells = match reply {
        BytesFrame::Null => vec![Cell::Null],
        BytesFrame::BulkString(bytes) => vec![Cell::Text(utf8(&bytes))],
        BytesFrame::SimpleString(bytes) => vec![Cell::Text(utf8(&bytes))],
        BytesFrame::Integer(value) => vec![Cell::Text(value.to_string())],
        BytesFrame::Error(message) => vec![Cell::Text(message.to_string())],
        BytesFrame::Array(children) => flatten(children),
    };
    debug!(cells = cells.len(), "decoded reply");
    cells
}

fn flatten(children: Vec<BytesFrame>) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(children.len());
    let mut stack = vec![children.into_iter()];
    while let Some(level) = stack.last_mut() {
        match level.next() {
            Some(BytesFrame::Array(nested)) => stack.push(nested.into_iter()),
            Some(BytesFrame::BulkString(bytes)) => cells.push(Cell::Text(utf8(&bytes))),
            Some(BytesFrame::Null) => cells.push(Cell::Null),
            Some(other) => {
                let shape = describe(&other);
                warn!(shape = %shape, "cannot decode reply element");
                cells.push(Cell::Undecodable(shape));
            }
            None => {
                stack.pop();
            }
        }
    }
    cells
}

fn describe(frame: &BytesFrame) -> String {
    match frame {
        BytesFrame::SimpleString(bytes) => format!("simple string {:?}", utf8(bytes)),
        BytesFrame::Error(message) => format!("error {:?}", &**message),
        BytesFrame::Integer(value) => format!("integer {value}"),
        BytesFrame::BulkString(_) => "bulk string".to_string(),
        BytesFrame::Array(children) => format!("array of {}", children.len()),
        BytesFrame::Null => "null".to_string(),
    }
}

fn utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn bulk(s: &str) -> BytesFrame {
        BytesFrame::BulkString(Bytes::from(s.to_string()))
    }

    fn texts(cells: &[Cell]) -> Vec<Option<&str>> {
        cells.iter().map(|c| c.as_text().unwrap()).collect()
    }

    #[test]
    fn null_reply_is_one_null_cell() {
        assert_eq!(decode(BytesFrame::Null), vec![Cell::Null]);
    }

    #[test]
    fn scalars_are_single_cells() {
        assert_eq!(decode(bulk("v")), vec![Cell::text("v")]);
        assert_eq!(decode(BytesFrame::Integer(-2)), vec![Cell::text("-2")]);
        assert_eq!(
            decode(BytesFrame::SimpleString(Bytes::from_static(b"OK"))),
            vec![Cell::text("OK")]
        );
    }

    #[test]
    fn flat_array_keeps_order_and_nulls() {
        let cells = decode(BytesFrame::Array(vec![bulk("a"), BytesFrame::Null, bulk("c")]));
        assert_eq!(texts(&cells), vec![Some("a"), None, Some("c")]);
        assert!(cells[1].is_null());
        assert!(!cells[0].is_null());
    }

    #[test]
    fn nested_arrays_flatten_in_pre_order() {
        let reply = BytesFrame::Array(vec![
            bulk("0"),
            BytesFrame::Array(vec![
                bulk("a"),
                BytesFrame::Array(vec![bulk("b"), BytesFrame::Array(vec![bulk("c")])]),
                bulk("d"),
            ]),
            bulk("e"),
        ]);
        let cells = decode(reply);
        assert_eq!(
            texts(&cells),
            vec![Some("0"), Some("a"), Some("b"), Some("c"), Some("d"), Some("e")]
        );
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let mut reply = bulk("leaf");
        for _ in 0..10_000 {
            reply = BytesFrame::Array(vec![reply]);
        }
        assert_eq!(decode(reply), vec![Cell::text("leaf")]);
    }

    #[test]
    fn empty_array_has_no_cells() {
        assert!(decode(BytesFrame::Array(Vec::new())).is_empty());
    }

    #[test]
    fn unsupported_element_defers_the_error_to_its_cell() {
        let cells = decode(BytesFrame::Array(vec![bulk("a"), BytesFrame::Integer(7)]));
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].as_text().unwrap(), Some("a"));
        assert!(matches!(cells[1].as_text(), Err(Error::Decode(_))));
    }
}
