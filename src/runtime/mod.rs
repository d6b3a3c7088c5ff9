pub mod error;
mod logging;

use crate::common::*;
use crate::engine::{
    broadcast::{self, BinaryOp},
    filemap::{FileProvider, StdFileProvider},
    subscript::{self, Modifiers, SubscriptArg},
};
use crate::value::SymbolTable;

pub trait Logger: Debug {
    fn line_writer(&mut self) -> Option<&mut dyn std::io::Write>;
    fn dump_log(&self, _w: &mut dyn std::io::Write) {}
}
#[derive(Debug)]
pub struct DummyLogger;
#[derive(Debug)]
pub struct VecLogger(String, Vec<u8>);
#[derive(Debug)]
pub struct FileLogger(String, std::fs::File);

/// Tunables of the runtime core. The executor usually builds this once per
/// interpreter session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Highest rank accepted for any array.
    pub max_dims: usize,
    /// Element-count ceiling for a single allocation.
    pub max_elements: usize,
    /// Lets binary operators write their result into a free temporary
    /// operand instead of allocating.
    pub reuse_buffers: bool,
    /// Lets dimension loops merge contiguous, fully traversed axes.
    pub collapse_runs: bool,
}

/// One interpreter session's worth of runtime core state: the symbol table
/// every value lives in, plus the provider used to reach file-backed arrays.
/// This is the surface the statement executor drives.
#[derive(Debug)]
pub struct Session {
    symbols: SymbolTable,
    files: Box<dyn FileProvider>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_dims: MAX_DIMS,
            max_elements: u32::MAX as usize,
            reuse_buffers: true,
            collapse_runs: true,
        }
    }
}

impl Session {
    pub fn new(config: CoreConfig, logger: Box<dyn Logger>) -> Self {
        Self { symbols: SymbolTable::new(config, logger), files: Box::new(StdFileProvider) }
    }

    pub fn new_simple() -> Self {
        Self::new(CoreConfig::default(), Box::new(DummyLogger))
    }

    pub fn with_file_provider(mut self, files: Box<dyn FileProvider>) -> Self {
        self.files = files;
        self
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Elementwise `lhs op rhs` with implicit-dimension broadcasting. The
    /// returned handle may be one of the operands if that operand was a free
    /// temporary.
    pub fn apply_binop<O: BinaryOp>(&mut self, lhs: Symbol, rhs: Symbol, op: &O) -> CoreResult<Symbol> {
        broadcast::apply_binop(&mut self.symbols, lhs, rhs, op)
    }

    /// Evaluates `source(subscripts...)` into a fresh temporary.
    pub fn extract(
        &mut self,
        source: Symbol,
        subscripts: &[SubscriptArg],
        modifiers: Modifiers,
    ) -> CoreResult<Symbol> {
        subscript::extract(&mut self.symbols, self.files.as_ref(), source, subscripts, modifiers)
    }

    /// Like `extract`, but with subscripts that were already materialized as
    /// values (scalars, ranges, subscript specs or index arrays).
    pub fn extract_with_symbols(
        &mut self,
        source: Symbol,
        subscripts: &[Symbol],
        modifiers: Modifiers,
    ) -> CoreResult<Symbol> {
        let args = subscripts
            .iter()
            .map(|&s| SubscriptArg::from_symbol(&self.symbols, s))
            .collect::<CoreResult<Vec<_>>>()?;
        self.extract(source, &args, modifiers)
    }

    /// Called by the executor once a statement's expression is done: every
    /// temporary nobody holds on to is reclaimed.
    pub fn end_statement(&mut self) -> usize {
        self.symbols.release_free_temps()
    }
}
