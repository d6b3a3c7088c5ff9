///////////////////// PRELUDE /////////////////////

pub(crate) use crate::runtime::{
    error::{CoreError, CoreResult},
    CoreConfig, Logger,
};
pub(crate) use crate::value::{Element, Numeric, TypeTag, Value};

pub(crate) use core::fmt::{Debug, Formatter};
pub(crate) use std::collections::{HashMap, VecDeque};

/// Upper bound on the rank of any array value.
pub const MAX_DIMS: usize = 8;

/// Handle to a value living in a `SymbolTable`. The generation guards
/// against a released slot being reached through a stale handle.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, Hash, PartialOrd, serde::Serialize, serde::Deserialize,
)]
pub struct Symbol {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

///////////////////// IMPL /////////////////////
impl Symbol {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
    pub fn index(&self) -> u32 {
        self.index
    }
}
impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "sym#{}.{}", self.index, self.generation)
    }
}

/// Number of elements described by `dims`, or `None` on overflow.
pub(crate) fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Element strides of a dense array: axis 0 varies fastest.
pub(crate) fn natural_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(dims.len());
    let mut acc = 1;
    for &d in dims {
        strides.push(acc);
        acc *= d;
    }
    strides
}
