#[macro_use]
mod macros;

mod collections;
mod common;
pub mod engine;
mod runtime;
pub mod value;

#[cfg(test)]
mod tests;

pub use common::{Symbol, MAX_DIMS};
pub use engine::{
    broadcast::{Add, BinaryOp, BitAnd, BitOr, Divide, Max, Min, Multiply, Run, Subtract},
    dim_loop::{DimensionLoop, LoopLevel, LoopMode},
    filemap::{FileHandle, FileProvider, StdFileProvider},
    subscript::{FancySpec, Modifiers, SubscriptArg},
};
pub use runtime::{
    error::{CoreError, CoreResult},
    CoreConfig, DummyLogger, FileLogger, Logger, Session, VecLogger,
};
pub use value::{
    promote, Binding, Element, FileMap, Numeric, RangeSpec, SymbolTable, TempState, TypeTag,
    Value,
};
