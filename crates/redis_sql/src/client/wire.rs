//! Blocking RESP2 connection over a TCP stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use redis_protocol::codec::Resp2;
use redis_protocol::resp2::types::BytesFrame;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use super::ClientError;

const READ_CHUNK: usize = 16 * 1024;

/// One request/response connection. Every call writes a command frame and
/// blocks until a full reply frame has been read; no read timeout is set.
pub struct RespConnection {
    stream: TcpStream,
    codec: Resp2,
    read_buf: BytesMut,
    write_buf: BytesMut,
    peer: String,
}

impl RespConnection {
    /// Connects to `addr` (`host:port`), trying every resolved address.
    pub fn connect(addr: &str, connect_timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut last_err = None;
        for socket_addr in addr.to_socket_addrs()? {
            let attempt = match connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&socket_addr, timeout),
                None => TcpStream::connect(socket_addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(peer = %addr, "connected");
                    return Ok(Self::from_stream(stream, addr));
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(ClientError::Io(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{addr} did not resolve to any address"),
            )
        })))
    }

    pub fn from_stream(stream: TcpStream, peer: &str) -> Self {
        Self {
            stream,
            codec: Resp2::default(),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            peer: peer.to_string(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Runs the connection preamble: `AUTH [username] password`, then
    /// `CLIENT SETNAME name`. Each step is skipped when its input is absent.
    pub fn handshake(
        &mut self,
        username: Option<&str>,
        password: Option<&str>,
        client_name: Option<&str>,
    ) -> Result<(), ClientError> {
        if let Some(password) = password {
            let mut args: Vec<String> = username.map(str::to_string).into_iter().collect();
            args.push(password.to_string());
            self.call("AUTH", &args)?;
        }
        if let Some(name) = client_name {
            self.call("CLIENT", &["SETNAME".to_string(), name.to_string()])?;
        }
        Ok(())
    }

    /// Sends one command and returns its reply. An error reply becomes
    /// [`ClientError::Reply`].
    pub fn call(&mut self, command: &str, args: &[String]) -> Result<BytesFrame, ClientError> {
        self.write_command(command, args)?;
        match self.read_frame()? {
            BytesFrame::Error(message) => Err(ClientError::Reply(message.to_string())),
            frame => Ok(frame),
        }
    }

    fn write_command(&mut self, command: &str, args: &[String]) -> Result<(), ClientError> {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(BytesFrame::BulkString(Bytes::copy_from_slice(command.as_bytes())));
        parts.extend(
            args.iter()
                .map(|arg| BytesFrame::BulkString(Bytes::copy_from_slice(arg.as_bytes()))),
        );
        let written = self
            .codec
            .encode(BytesFrame::Array(parts), &mut self.write_buf)
            .map_err(|err| ClientError::Protocol(err.to_string()))
            .and_then(|()| {
                self.stream.write_all(&self.write_buf)?;
                self.stream.flush()?;
                Ok(())
            });
        trace!(peer = %self.peer, bytes = self.write_buf.len(), ok = written.is_ok(), "wrote command");
        // A failed write must not leave bytes queued ahead of the next command.
        self.write_buf.clear();
        written
    }

    /// Reads one reply frame. Buffered bytes are discarded on failure.
    fn read_frame(&mut self) -> Result<BytesFrame, ClientError> {
        let frame = self.next_frame();
        if frame.is_err() {
            self.read_buf.clear();
        }
        frame
    }

    fn next_frame(&mut self) -> Result<BytesFrame, ClientError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self
                .codec
                .decode(&mut self.read_buf)
                .map_err(|err| ClientError::Protocol(err.to_string()))?
            {
                return Ok(frame);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(ClientError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} closed the connection", self.peer),
                )));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Best-effort socket shutdown.
    pub fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        debug!(peer = %self.peer, "connection shut down");
    }
}
