//! Key/value projections for hash-shaped replies.

use std::collections::HashMap;

use crate::decode::Cell;
use crate::error::{Error, Result};

/// Strategy for splitting a flat reply into parallel key and value columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashProjection {
    /// `key, value, key, value, ...` as returned by `HGETALL`.
    InterleavedPairs,
    /// Keys are the command arguments after the container name; the reply
    /// holds the values in the same order (`HMGET h f1 f2`).
    ArgsAreKeys,
}

impl HashProjection {
    pub fn name(&self) -> &'static str {
        match self {
            HashProjection::InterleavedPairs => "interleaved_pairs",
            HashProjection::ArgsAreKeys => "args_are_keys",
        }
    }

    /// Splits `cells` into `(keys, values)` of equal length.
    pub fn project(&self, cells: Vec<Cell>, args: &[String]) -> Result<(Vec<Cell>, Vec<Cell>)> {
        let (keys, values) = match self {
            HashProjection::InterleavedPairs => {
                if cells.len() % 2 != 0 {
                    return Err(Error::InvalidRowSet(format!(
                        "expected key/value pairs, got {} elements",
                        cells.len()
                    )));
                }
                let mut keys = Vec::with_capacity(cells.len() / 2);
                let mut values = Vec::with_capacity(cells.len() / 2);
                let mut cells = cells.into_iter();
                while let (Some(key), Some(value)) = (cells.next(), cells.next()) {
                    keys.push(key);
                    values.push(value);
                }
                (keys, values)
            }
            HashProjection::ArgsAreKeys => {
                let keys = args.iter().skip(1).cloned().map(Cell::Text).collect();
                (keys, cells)
            }
        };
        if keys.len() != values.len() {
            return Err(Error::InvalidRowSet(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        Ok((keys, values))
    }
}

/// Command name to projection lookup.
#[derive(Clone, Debug)]
pub struct HashRegistry {
    projections: HashMap<String, HashProjection>,
}

impl HashRegistry {
    pub fn empty() -> Self {
        Self {
            projections: HashMap::new(),
        }
    }

    /// `HGETALL` as interleaved pairs; `HMGET` and `HGET` with argument keys.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("HGETALL", HashProjection::InterleavedPairs);
        registry.register("HMGET", HashProjection::ArgsAreKeys);
        registry.register("HGET", HashProjection::ArgsAreKeys);
        registry
    }

    pub fn register(&mut self, command: &str, projection: HashProjection) {
        self.projections
            .insert(command.to_ascii_uppercase(), projection);
    }

    pub fn lookup(&self, command: &str) -> Option<HashProjection> {
        self.projections.get(&command.to_ascii_uppercase()).copied()
    }
}

impl Default for HashRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
