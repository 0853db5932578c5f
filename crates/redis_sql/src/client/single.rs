//! Single-node client with an active logical database.

use tracing::{debug, info};

use super::wire::RespConnection;
use super::{ClientError, CommandClient};
use crate::config::NodeConfig;
use crate::decode::RawReply;

pub struct SingleNodeClient {
    conn: Option<RespConnection>,
    db_index: i64,
}

impl SingleNodeClient {
    /// Connects, authenticates, names the client, and selects the configured
    /// database when it is not 0.
    pub fn connect(config: &NodeConfig) -> Result<Self, ClientError> {
        let mut conn = RespConnection::connect(&config.addr, config.connect_timeout)?;
        conn.handshake(
            config.username.as_deref(),
            config.password.as_deref(),
            config.client_name.as_deref(),
        )?;
        let mut client = Self::from_connection(conn);
        if config.db_index != 0 {
            client.select(config.db_index)?;
        }
        info!(addr = %config.addr, db = client.db_index, "single-node client ready");
        Ok(client)
    }

    /// Wraps an already prepared connection on database 0.
    pub fn from_connection(conn: RespConnection) -> Self {
        Self {
            conn: Some(conn),
            db_index: 0,
        }
    }

    fn conn(&mut self) -> Result<&mut RespConnection, ClientError> {
        self.conn.as_mut().ok_or(ClientError::Closed)
    }
}

impl CommandClient for SingleNodeClient {
    fn send(
        &mut self,
        command: &str,
        args: &[String],
        _route: Option<&str>,
    ) -> Result<RawReply, ClientError> {
        self.conn()?.call(command, args)
    }

    fn select(&mut self, db_index: i64) -> Result<(), ClientError> {
        self.conn()?.call("SELECT", &[db_index.to_string()])?;
        debug!(from = self.db_index, to = db_index, "selected database");
        self.db_index = db_index;
        Ok(())
    }

    fn db_index(&self) -> i64 {
        self.db_index
    }

    fn supports_multiple_databases(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<(), ClientError> {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown();
        }
        Ok(())
    }
}
