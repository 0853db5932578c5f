//! Store clients.
//!
//! Everything above this module sees the store only through
//! [`CommandClient`]: send a command with its arguments, get a raw reply.
//! Two implementations exist, a single-node client that tracks the active
//! logical database, and a cluster client that routes by key slot.

pub mod cluster;
pub mod single;
pub mod wire;

use thiserror::Error;

use crate::decode::RawReply;

pub use cluster::ClusterClient;
pub use single::SingleNodeClient;
pub use wire::RespConnection;

/// Failures below the statement layer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream was not valid RESP2.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store answered with an error reply.
    #[error("{0}")]
    Reply(String),

    /// No node owns the slot, or the store redirected the command.
    #[error("routing error: {0}")]
    Routing(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("client is closed")]
    Closed,
}

/// Capability to talk to the store.
///
/// Implementations are not safe for unsynchronized concurrent use; the
/// connection layer serializes every call behind a mutex.
pub trait CommandClient: Send {
    /// Sends `command` with `args`. `route` is a key used by clients that
    /// shard by key; others ignore it.
    fn send(
        &mut self,
        command: &str,
        args: &[String],
        route: Option<&str>,
    ) -> Result<RawReply, ClientError>;

    /// Switches the active logical database for subsequent sends.
    fn select(&mut self, db_index: i64) -> Result<(), ClientError>;

    /// Active logical database, 0 for clients without the concept.
    fn db_index(&self) -> i64;

    fn supports_multiple_databases(&self) -> bool;

    /// Releases network resources. Idempotent.
    fn close(&mut self) -> Result<(), ClientError>;
}

impl<C: CommandClient + ?Sized> CommandClient for Box<C> {
    fn send(
        &mut self,
        command: &str,
        args: &[String],
        route: Option<&str>,
    ) -> Result<RawReply, ClientError> {
        (**self).send(command, args, route)
    }

    fn select(&mut self, db_index: i64) -> Result<(), ClientError> {
        (**self).select(db_index)
    }

    fn db_index(&self) -> i64 {
        (**self).db_index()
    }

    fn supports_multiple_databases(&self) -> bool {
        (**self).supports_multiple_databases()
    }

    fn close(&mut self) -> Result<(), ClientError> {
        (**self).close()
    }
}
