//! Statement execution: parse, dispatch, decode, and shape into a cursor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::client::{ClientError, ClusterClient, CommandClient, SingleNodeClient};
use crate::commands;
use crate::config::{ClusterConfig, ConnectionOptions, NodeConfig};
use crate::convert::ConverterRegistry;
use crate::cursor::Cursor;
use crate::decode::{decode, Cell};
use crate::error::{Error, Result};
use crate::hash::HashRegistry;
use crate::parser::{parse_statement, Op};

/// Statements handled without sending their text to the store.
enum SpecialForm<'a> {
    /// `USE <index>`
    Use(Option<&'a str>),
    /// `SELECT DB_NAME()`
    DbName,
    /// `SELECT keep_alive`
    KeepAlive,
    /// `SELECT <index>`, kept in step with the tracked index.
    Select(&'a str),
}

impl<'a> SpecialForm<'a> {
    fn detect(op: &'a Op) -> Option<Self> {
        let args = op.args();
        if op.command() == "USE" {
            let index = args.iter().map(|arg| arg.trim()).find(|arg| !arg.is_empty());
            return Some(SpecialForm::Use(index));
        }
        if !op.command().eq_ignore_ascii_case("SELECT") || args.len() != 1 {
            return None;
        }
        let arg = args[0].as_str();
        if arg.eq_ignore_ascii_case("DB_NAME()") {
            Some(SpecialForm::DbName)
        } else if arg.eq_ignore_ascii_case("keep_alive") {
            Some(SpecialForm::KeepAlive)
        } else {
            Some(SpecialForm::Select(arg))
        }
    }
}

struct Shared {
    client: Mutex<Box<dyn CommandClient>>,
    closed: AtomicBool,
    options: ConnectionOptions,
    converters: ConverterRegistry,
    hashes: HashRegistry,
}

impl Shared {
    fn client(&self) -> MutexGuard<'_, Box<dyn CommandClient>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed("connection"));
        }
        Ok(())
    }

    fn run(&self, text: &str) -> Result<Cursor> {
        self.check_open()?;
        let op = parse_statement(text, &self.options.allowed_hint_keys)?;
        let mut client = self.client();
        let db_index = client.db_index();

        let rewritten = match SpecialForm::detect(&op) {
            Some(SpecialForm::Use(None)) => return Err(Error::UnknownCommand("USE".to_string())),
            Some(SpecialForm::Use(Some(raw))) => {
                let index = raw.trim_matches(|c| c == '\'' || c == '"');
                let db = switch_db(&mut **client, text, index)?;
                return Ok(single_row(format!("DB switched to {db}")));
            }
            Some(SpecialForm::DbName) => return Ok(single_row(db_index.to_string())),
            Some(SpecialForm::KeepAlive) => Some(op.rewrite("PING", Vec::new())),
            Some(SpecialForm::Select(index))
                if client.supports_multiple_databases() && index.parse::<i64>().is_ok() =>
            {
                switch_db(&mut **client, text, index)?;
                return Ok(single_row("OK".to_string()));
            }
            _ => None,
        };
        let op = rewritten.unwrap_or(op);

        let command = commands::resolve(op.command())?;
        debug!(statement = %text, command = %command, db = db_index, "dispatching statement");
        let reply = client
            .send(command, op.args(), op.sample_key())
            .map_err(|err| execution_error(text, db_index, err))?;
        drop(client);

        self.shape(command, decode(reply), op.args())
    }

    fn shape(&self, command: &str, cells: Vec<Cell>, args: &[String]) -> Result<Cursor> {
        let features = self.options.features;
        if features.hash_result_conversions {
            if let Some(projection) = self.hashes.lookup(command) {
                debug!(command = %command, projection = projection.name(), "projecting hash reply");
                return Cursor::projected(projection, cells, args);
            }
        }
        let converter = if features.extra_column_conversions {
            self.converters.lookup(command).cloned()
        } else {
            None
        };
        Ok(Cursor::single(cells, args.to_vec(), converter))
    }
}

/// Parses `raw` as a database index and selects it.
fn switch_db(client: &mut dyn CommandClient, statement: &str, raw: &str) -> Result<i64> {
    let db_index = client.db_index();
    if !client.supports_multiple_databases() {
        return Err(Error::Unsupported(
            "this client has no logical databases".to_string(),
        ));
    }
    let target: i64 = raw.trim().parse().map_err(|err| Error::Execution {
        statement: statement.to_string(),
        db_index,
        message: format!("invalid database index {raw:?}: {err}"),
    })?;
    client
        .select(target)
        .map_err(|err| execution_error(statement, db_index, err))?;
    info!(from = db_index, to = target, "database switched");
    Ok(target)
}

fn execution_error(statement: &str, db_index: i64, err: ClientError) -> Error {
    warn!(statement = %statement, db = db_index, error = %err, "statement failed");
    match err {
        ClientError::Unsupported(message) => Error::Unsupported(message),
        ClientError::Closed => Error::Closed("client"),
        other => Error::Execution {
            statement: statement.to_string(),
            db_index,
            message: other.to_string(),
        },
    }
}

fn single_row(text: String) -> Cursor {
    Cursor::single(vec![Cell::Text(text)], Vec::new(), None)
}

/// A session over one store client.
///
/// Clones share the client; dispatches from any clone serialize.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub fn new(client: impl CommandClient + 'static, options: ConnectionOptions) -> Self {
        Self::with_registries(
            client,
            options,
            ConverterRegistry::builtin(),
            HashRegistry::builtin(),
        )
    }

    pub fn with_registries(
        client: impl CommandClient + 'static,
        options: ConnectionOptions,
        converters: ConverterRegistry,
        hashes: HashRegistry,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                client: Mutex::new(Box::new(client)),
                closed: AtomicBool::new(false),
                options,
                converters,
                hashes,
            }),
        }
    }

    /// Connects a single-node client.
    pub fn open(config: &NodeConfig, options: ConnectionOptions) -> Result<Self> {
        let client = SingleNodeClient::connect(config)
            .map_err(|err| Error::Connect(format!("{}: {err}", config.addr)))?;
        Ok(Self::new(client, options))
    }

    /// Connects a cluster client.
    pub fn open_cluster(config: ClusterConfig, options: ConnectionOptions) -> Result<Self> {
        let seeds = config.seeds.join(",");
        let client = ClusterClient::connect(config)
            .map_err(|err| Error::Connect(format!("{seeds}: {err}")))?;
        Ok(Self::new(client, options))
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.shared.options
    }

    pub fn create_statement(&self) -> Result<Statement> {
        self.shared.check_open()?;
        Ok(Statement {
            shared: Arc::clone(&self.shared),
            cursor: None,
            closed: false,
        })
    }

    /// Active database index as text.
    pub fn schema(&self) -> Result<String> {
        self.shared.check_open()?;
        Ok(self.shared.client().db_index().to_string())
    }

    pub fn set_schema(&self, schema: &str) -> Result<()> {
        self.shared.check_open()?;
        let mut client = self.shared.client();
        switch_db(&mut **client, schema, schema).map(|_| ())
    }

    /// Whether the store answers a `PING`.
    pub fn is_valid(&self) -> bool {
        if self.shared.check_open().is_err() {
            return false;
        }
        let ok = self.shared.client().send("PING", &[], None).is_ok();
        if !ok {
            warn!("connection failed validation");
        }
        ok
    }

    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("closing connection");
        let mut client = self.shared.client();
        let db_index = client.db_index();
        client
            .close()
            .map_err(|err| execution_error("CLOSE", db_index, err))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Executes statements and owns the most recent cursor.
pub struct Statement {
    shared: Arc<Shared>,
    cursor: Option<Cursor>,
    closed: bool,
}

impl Statement {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("statement"));
        }
        self.shared.check_open()
    }

    /// Runs `text`, replacing (and closing) the previous cursor.
    pub fn execute_query(&mut self, text: &str) -> Result<&mut Cursor> {
        self.check_open()?;
        if let Some(mut previous) = self.cursor.take() {
            previous.close();
        }
        let cursor = self.shared.run(text)?;
        Ok(self.cursor.insert(cursor))
    }

    /// Like [`Statement::execute_query`]; always reports that a result exists.
    pub fn execute(&mut self, text: &str) -> Result<bool> {
        self.execute_query(text).map(|_| true)
    }

    pub fn result_set(&mut self) -> Result<Option<&mut Cursor>> {
        self.check_open()?;
        Ok(self.cursor.as_mut())
    }

    pub fn execute_update(&mut self, _text: &str) -> Result<u64> {
        self.check_open()?;
        Err(Error::Unsupported("execute_update".to_string()))
    }

    pub fn execute_batch(&mut self, _statements: &[&str]) -> Result<Vec<u64>> {
        self.check_open()?;
        Err(Error::Unsupported("batch execution".to_string()))
    }

    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
        if !self.closed {
            debug!("statement closed");
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.shared.closed.load(Ordering::Acquire)
    }
}
