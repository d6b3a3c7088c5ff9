mod convert;
mod store;
mod types;
#[allow(clippy::module_inception)]
mod value;

pub use convert::promote;
pub use store::{Binding, SymbolTable, TempState};
pub use types::{read_as, Element, Numeric, TypeTag};
pub use value::{
    ArrayValue, CompoundEntry, FileMap, RangeSpec, ScalarValue, StrArrayValue, Value,
};
