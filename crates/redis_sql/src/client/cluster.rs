//! Cluster client: slot discovery and key routing.
//!
//! Slot ownership is read once with `CLUSTER SLOTS` from the first seed that
//! answers. Keys map to slots with CRC16 and connections to owning nodes are
//! opened on first use. Redirections are reported, not followed.

use std::collections::HashMap;

use redis_protocol::redis_keyslot;
use redis_protocol::resp2::types::BytesFrame;
use tracing::{debug, info, warn};

use super::wire::RespConnection;
use super::{ClientError, CommandClient};
use crate::config::ClusterConfig;
use crate::decode::RawReply;

/// Inclusive slot range served by one primary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub addr: String,
}

pub struct ClusterClient {
    config: ClusterConfig,
    /// Address unrouted commands go to.
    default_addr: String,
    slots: Vec<SlotRange>,
    nodes: HashMap<String, RespConnection>,
    closed: bool,
}

impl ClusterClient {
    /// Tries each seed in order until one returns the slot table.
    pub fn connect(config: ClusterConfig) -> Result<Self, ClientError> {
        let mut last_err = None;
        for seed in &config.seeds {
            match Self::discover(&config, seed) {
                Ok((conn, slots)) => {
                    info!(seed = %seed, ranges = slots.len(), "cluster slots discovered");
                    let mut nodes = HashMap::new();
                    nodes.insert(seed.clone(), conn);
                    return Ok(Self {
                        default_addr: seed.clone(),
                        config,
                        slots,
                        nodes,
                        closed: false,
                    });
                }
                Err(err) => {
                    warn!(seed = %seed, error = %err, "cluster seed unavailable");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ClientError::Routing("no cluster seeds configured".to_string())))
    }

    fn discover(
        config: &ClusterConfig,
        seed: &str,
    ) -> Result<(RespConnection, Vec<SlotRange>), ClientError> {
        let mut conn = Self::open(config, seed)?;
        let reply = conn.call("CLUSTER", &["SLOTS".to_string()])?;
        let slots = parse_slots(reply, seed)?;
        Ok((conn, slots))
    }

    fn open(config: &ClusterConfig, addr: &str) -> Result<RespConnection, ClientError> {
        let mut conn = RespConnection::connect(addr, config.connect_timeout)?;
        conn.handshake(config.username.as_deref(), config.password.as_deref(), None)?;
        Ok(conn)
    }

    pub fn slots(&self) -> &[SlotRange] {
        &self.slots
    }

    /// Address of the primary owning `key`.
    pub fn node_for_key(&self, key: &str) -> Result<&str, ClientError> {
        let slot = redis_keyslot(key.as_bytes());
        self.slots
            .iter()
            .find(|range| range.start <= slot && slot <= range.end)
            .map(|range| range.addr.as_str())
            .ok_or_else(|| ClientError::Routing(format!("slot {slot} for key {key:?} has no owner")))
    }

    fn connection(&mut self, addr: &str) -> Result<&mut RespConnection, ClientError> {
        if !self.nodes.contains_key(addr) {
            let conn = Self::open(&self.config, addr)?;
            debug!(addr = %addr, "opened cluster node connection");
            self.nodes.insert(addr.to_string(), conn);
        }
        self.nodes
            .get_mut(addr)
            .ok_or_else(|| ClientError::Routing(format!("no connection to {addr}")))
    }
}

impl CommandClient for ClusterClient {
    fn send(
        &mut self,
        command: &str,
        args: &[String],
        route: Option<&str>,
    ) -> Result<RawReply, ClientError> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        let addr = match route {
            Some(key) => self.node_for_key(key)?.to_string(),
            None => self.default_addr.clone(),
        };
        debug!(addr = %addr, command = %command, routed = route.is_some(), "cluster send");
        let reply = self.connection(&addr)?.call(command, args);
        match reply {
            Err(ClientError::Reply(message))
                if message.starts_with("MOVED ") || message.starts_with("ASK ") =>
            {
                Err(ClientError::Routing(message))
            }
            Err(err @ (ClientError::Io(_) | ClientError::Protocol(_))) => {
                // The next command to this node opens a fresh connection.
                if let Some(mut conn) = self.nodes.remove(&addr) {
                    conn.shutdown();
                }
                warn!(addr = %addr, error = %err, "dropped broken cluster node connection");
                Err(err)
            }
            other => other,
        }
    }

    fn select(&mut self, _db_index: i64) -> Result<(), ClientError> {
        Err(ClientError::Unsupported(
            "cluster clients have no logical databases".to_string(),
        ))
    }

    fn db_index(&self) -> i64 {
        0
    }

    fn supports_multiple_databases(&self) -> bool {
        false
    }

    fn close(&mut self) -> Result<(), ClientError> {
        for (_, mut conn) in self.nodes.drain() {
            conn.shutdown();
        }
        self.closed = true;
        Ok(())
    }
}

/// Parses a `CLUSTER SLOTS` reply. Replica entries are ignored; an empty
/// host means "the node that answered".
pub fn parse_slots(reply: BytesFrame, answered_by: &str) -> Result<Vec<SlotRange>, ClientError> {
    let BytesFrame::Array(entries) = reply else {
        return Err(ClientError::Protocol("CLUSTER SLOTS reply is not an array".to_string()));
    };
    let fallback_host = answered_by
        .rsplit_once(':')
        .map_or(answered_by, |(host, _)| host);

    let mut slots = Vec::with_capacity(entries.len());
    for entry in entries {
        let BytesFrame::Array(parts) = entry else {
            return Err(ClientError::Protocol("slot entry is not an array".to_string()));
        };
        let [start, end, primary, ..] = parts.as_slice() else {
            return Err(ClientError::Protocol("slot entry is too short".to_string()));
        };
        let BytesFrame::Array(node) = primary else {
            return Err(ClientError::Protocol("slot owner is not an array".to_string()));
        };
        let [host, port, ..] = node.as_slice() else {
            return Err(ClientError::Protocol("slot owner is too short".to_string()));
        };
        let host = match frame_text(host)? {
            host if host.is_empty() || host == "?" => fallback_host.to_string(),
            host => host,
        };
        slots.push(SlotRange {
            start: frame_slot(start)?,
            end: frame_slot(end)?,
            addr: format!("{host}:{}", frame_int(port)?),
        });
    }
    slots.sort_by_key(|range| range.start);
    Ok(slots)
}

fn frame_text(frame: &BytesFrame) -> Result<String, ClientError> {
    match frame {
        BytesFrame::BulkString(bytes) | BytesFrame::SimpleString(bytes) => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        other => Err(ClientError::Protocol(format!("expected text, got {other:?}"))),
    }
}

fn frame_int(frame: &BytesFrame) -> Result<i64, ClientError> {
    match frame {
        BytesFrame::Integer(value) => Ok(*value),
        other => frame_text(other)?
            .parse()
            .map_err(|err| ClientError::Protocol(format!("expected integer: {err}"))),
    }
}

fn frame_slot(frame: &BytesFrame) -> Result<u16, ClientError> {
    let value = frame_int(frame)?;
    u16::try_from(value)
        .ok()
        .filter(|slot| *slot < 16384)
        .ok_or_else(|| ClientError::Protocol(format!("slot {value} out of range")))
}
