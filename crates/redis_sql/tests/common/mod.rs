//! Shared helpers for integration tests.
//!
//! `FakeRedis` is a small in-process RESP2 server on an ephemeral port. It
//! keeps strings and hashes per logical database, understands enough of the
//! command set for the statement layer, and can act as one node of a slot
//! partitioned cluster.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::{Bytes, BytesMut};
use redis_protocol::codec::Resp2;
use redis_protocol::redis_keyslot;
use redis_protocol::resp2::types::BytesFrame;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Clone, Debug)]
enum Entry {
    Text(String),
    Hash(Vec<(String, String)>),
}

#[derive(Default)]
struct Store {
    dbs: HashMap<i64, HashMap<String, Entry>>,
    /// Every request received, as `(db, parts)`.
    log: Vec<(i64, Vec<String>)>,
}

/// Slot ownership shared by every node of a fake cluster.
#[derive(Clone, Debug)]
struct SlotOwner {
    start: u16,
    end: u16,
    port: u16,
}

#[derive(Clone)]
pub struct FakeRedis {
    pub addr: String,
    port: u16,
    store: Arc<Mutex<Store>>,
    password: Option<String>,
    cluster: Option<Arc<Vec<SlotOwner>>>,
}

impl FakeRedis {
    /// Standalone node without authentication.
    pub fn start() -> Self {
        Self::spawn(TcpListener::bind("127.0.0.1:0").expect("bind fake redis"), None, None)
    }

    /// Standalone node requiring `AUTH password`.
    pub fn start_with_password(password: &str) -> Self {
        Self::spawn(
            TcpListener::bind("127.0.0.1:0").expect("bind fake redis"),
            Some(password.to_string()),
            None,
        )
    }

    /// `count` nodes splitting the slot space evenly, in slot order.
    pub fn start_cluster(count: u16) -> Vec<Self> {
        let listeners: Vec<TcpListener> = (0..count)
            .map(|_| TcpListener::bind("127.0.0.1:0").expect("bind fake cluster node"))
            .collect();
        let span = 16384 / count;
        let owners: Vec<SlotOwner> = listeners
            .iter()
            .enumerate()
            .map(|(i, listener)| {
                let i = i as u16;
                SlotOwner {
                    start: i * span,
                    end: if i + 1 == count { 16383 } else { (i + 1) * span - 1 },
                    port: listener.local_addr().expect("local addr").port(),
                }
            })
            .collect();
        let owners = Arc::new(owners);
        listeners
            .into_iter()
            .map(|listener| Self::spawn(listener, None, Some(Arc::clone(&owners))))
            .collect()
    }

    fn spawn(
        listener: TcpListener,
        password: Option<String>,
        cluster: Option<Arc<Vec<SlotOwner>>>,
    ) -> Self {
        let port = listener.local_addr().expect("local addr").port();
        let server = Self {
            addr: format!("127.0.0.1:{port}"),
            port,
            store: Arc::new(Mutex::new(Store::default())),
            password,
            cluster,
        };
        let acceptor = server.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let session = acceptor.clone();
                thread::spawn(move || session.serve(stream));
            }
        });
        server
    }

    /// Requests received so far, as `(db, parts)`.
    pub fn requests(&self) -> Vec<(i64, Vec<String>)> {
        self.store.lock().unwrap().log.clone()
    }

    /// Commands received so far, excluding connection setup.
    pub fn commands(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|(_, parts)| parts.first().cloned())
            .filter(|cmd| !matches!(cmd.as_str(), "AUTH" | "CLIENT" | "CLUSTER"))
            .collect()
    }

    pub fn set(&self, db: i64, key: &str, value: &str) {
        self.store
            .lock()
            .unwrap()
            .dbs
            .entry(db)
            .or_default()
            .insert(key.to_string(), Entry::Text(value.to_string()));
    }

    pub fn hset(&self, db: i64, key: &str, pairs: &[(&str, &str)]) {
        let pairs = pairs
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        self.store
            .lock()
            .unwrap()
            .dbs
            .entry(db)
            .or_default()
            .insert(key.to_string(), Entry::Hash(pairs));
    }

    pub fn owns(&self, key: &str) -> bool {
        self.owner_of(key).map_or(true, |port| port == self.port)
    }

    fn owner_of(&self, key: &str) -> Option<u16> {
        let owners = self.cluster.as_ref()?;
        let slot = redis_keyslot(key.as_bytes());
        owners
            .iter()
            .find(|owner| owner.start <= slot && slot <= owner.end)
            .map(|owner| owner.port)
    }

    fn serve(self, mut stream: TcpStream) {
        let mut codec = Resp2::default();
        let mut read_buf = BytesMut::new();
        let mut write_buf = BytesMut::new();
        let mut chunk = [0u8; 4096];
        let mut db = 0i64;
        let mut authenticated = self.password.is_none();
        loop {
            let frame = match codec.decode(&mut read_buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        read_buf.extend_from_slice(&chunk[..n]);
                        continue;
                    }
                },
                Err(_) => return,
            };
            let parts = request_parts(frame);
            let reply = self.handle(&parts, &mut db, &mut authenticated);
            if codec.encode(reply, &mut write_buf).is_err() {
                return;
            }
            if stream.write_all(&write_buf).is_err() {
                return;
            }
            write_buf.clear();
        }
    }

    fn handle(&self, parts: &[String], db: &mut i64, authenticated: &mut bool) -> BytesFrame {
        let mut store = self.store.lock().unwrap();
        store.log.push((*db, parts.to_vec()));
        let Some(command) = parts.first().map(|c| c.to_ascii_uppercase()) else {
            return error("ERR empty command");
        };
        let args = &parts[1..];

        if command == "AUTH" {
            return match (&self.password, args.last()) {
                (Some(expected), Some(given)) if expected == given => {
                    *authenticated = true;
                    ok()
                }
                _ => error("WRONGPASS invalid username-password pair"),
            };
        }
        if !*authenticated {
            return error("NOAUTH Authentication required.");
        }
        if let Some(key) = key_of(&command, args) {
            if let Some(port) = self.owner_of(key).filter(|port| *port != self.port) {
                let slot = redis_keyslot(key.as_bytes());
                return error(&format!("MOVED {slot} 127.0.0.1:{port}"));
            }
        }

        let data = store.dbs.entry(*db).or_default();
        match (command.as_str(), args) {
            ("PING", []) => simple("PONG"),
            ("CLIENT", [sub, _name]) if sub.eq_ignore_ascii_case("SETNAME") => ok(),
            ("SELECT", [index]) => match index.parse() {
                Ok(index) if self.cluster.is_none() => {
                    *db = index;
                    ok()
                }
                Ok(_) => error("ERR SELECT is not allowed in cluster mode"),
                Err(_) => error("ERR value is not an integer or out of range"),
            },
            ("CLUSTER", [sub]) if sub.eq_ignore_ascii_case("SLOTS") => match &self.cluster {
                Some(owners) => BytesFrame::Array(
                    owners
                        .iter()
                        .map(|owner| {
                            BytesFrame::Array(vec![
                                BytesFrame::Integer(owner.start as i64),
                                BytesFrame::Integer(owner.end as i64),
                                BytesFrame::Array(vec![
                                    bulk("127.0.0.1"),
                                    BytesFrame::Integer(owner.port as i64),
                                ]),
                            ])
                        })
                        .collect(),
                ),
                None => error("ERR This instance has cluster support disabled"),
            },
            ("GET", [key]) => match data.get(key) {
                Some(Entry::Text(value)) => bulk(value),
                Some(Entry::Hash(_)) => wrong_type(),
                None => BytesFrame::Null,
            },
            ("SET", [key, value]) => {
                data.insert(key.clone(), Entry::Text(value.clone()));
                ok()
            }
            ("DBSIZE", []) => BytesFrame::Integer(data.len() as i64),
            ("HGETALL", [key]) => match data.get(key) {
                Some(Entry::Hash(pairs)) => BytesFrame::Array(
                    pairs
                        .iter()
                        .flat_map(|(f, v)| [bulk(f), bulk(v)])
                        .collect(),
                ),
                Some(Entry::Text(_)) => wrong_type(),
                None => BytesFrame::Array(Vec::new()),
            },
            ("HGET", [key, field]) => hash_field(data.get(key), field),
            ("HMGET", [key, fields @ ..]) if !fields.is_empty() => BytesFrame::Array(
                fields
                    .iter()
                    .map(|field| hash_field(data.get(key), field))
                    .collect(),
            ),
            ("TTL" | "PTTL" | "EXPIRETIME" | "PEXPIRETIME", [key]) => {
                BytesFrame::Integer(if data.contains_key(key) { -1 } else { -2 })
            }
            // Fixed nested reply: one entry with two field/value pairs.
            ("XRANGE", [_key, _start, _end]) => BytesFrame::Array(vec![BytesFrame::Array(vec![
                bulk("1-0"),
                BytesFrame::Array(vec![bulk("f1"), bulk("v1"), bulk("f2"), bulk("v2")]),
            ])]),
            _ => error(&format!("ERR unknown command or wrong arguments for '{command}'")),
        }
    }
}

fn key_of<'a>(command: &str, args: &'a [String]) -> Option<&'a str> {
    match command {
        "GET" | "SET" | "HGETALL" | "HGET" | "HMGET" | "TTL" | "PTTL" | "EXPIRETIME"
        | "PEXPIRETIME" | "XRANGE" => args.first().map(String::as_str),
        _ => None,
    }
}

fn hash_field(entry: Option<&Entry>, field: &str) -> BytesFrame {
    match entry {
        Some(Entry::Hash(pairs)) => pairs
            .iter()
            .find(|(f, _)| f == field)
            .map_or(BytesFrame::Null, |(_, v)| bulk(v)),
        Some(Entry::Text(_)) => wrong_type(),
        None => BytesFrame::Null,
    }
}

fn request_parts(frame: BytesFrame) -> Vec<String> {
    match frame {
        BytesFrame::Array(parts) => parts
            .into_iter()
            .map(|part| match part {
                BytesFrame::BulkString(bytes) | BytesFrame::SimpleString(bytes) => {
                    String::from_utf8_lossy(&bytes).into_owned()
                }
                other => format!("{other:?}"),
            })
            .collect(),
        other => vec![format!("{other:?}")],
    }
}

fn bulk(value: &str) -> BytesFrame {
    BytesFrame::BulkString(Bytes::from(value.to_string()))
}

fn simple(value: &'static str) -> BytesFrame {
    BytesFrame::SimpleString(Bytes::from_static(value.as_bytes()))
}

fn ok() -> BytesFrame {
    simple("OK")
}

fn error(message: &str) -> BytesFrame {
    BytesFrame::Error(message.to_string().into())
}

fn wrong_type() -> BytesFrame {
    error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

/// Pick an available local port by binding to port 0.
pub fn pick_free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
