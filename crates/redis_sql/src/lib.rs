//! Tabular query facade over the Redis command protocol.
//!
//! A statement such as `HGETALL user:1` is parsed into a command with
//! arguments, sent through a [`CommandClient`], decoded into cells, and
//! shaped into a forward-only [`Cursor`]: one `RESULTS` column by default,
//! `KEY`/`VALUE` columns for hash-shaped replies, or an extra typed column
//! for commands with a registered conversion (the `TTL` family).
//!
//! ```no_run
//! use redis_sql::{Connection, ConnectionOptions, NodeConfig};
//!
//! # fn main() -> redis_sql::Result<()> {
//! let conn = Connection::open(&NodeConfig::default(), ConnectionOptions::default())?;
//! let mut statement = conn.create_statement()?;
//! let cursor = statement.execute_query("HGETALL user:1")?;
//! while cursor.advance()? {
//!     println!("{:?} = {:?}", cursor.get_string("KEY")?, cursor.get_string("VALUE")?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod convert;
pub mod cursor;
pub mod decode;
pub mod error;
pub mod hash;
pub mod parser;

pub use client::{ClientError, ClusterClient, CommandClient, SingleNodeClient};
pub use config::{ClusterConfig, ConnectionOptions, Features, NodeConfig};
pub use connection::{Connection, Statement};
pub use convert::{ColumnConverter, ColumnType, Conversion, ConverterRegistry, Value};
pub use cursor::{ColumnIndex, Cursor, CursorMetadata, Positioning};
pub use decode::{decode, Cell, RawReply};
pub use error::{Error, Result};
pub use hash::{HashProjection, HashRegistry};
pub use parser::{parse_statement, Hint, HintKey, Op};
