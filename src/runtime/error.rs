use crate::common::*;

pub type CoreResult<T> = Result<T, CoreError>;

/// Every failure the runtime core reports. Variants carry enough context
/// (axis, given value, valid extent) for the caller to build a user-facing
/// message. None of them are fatal to the interpreter session.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Display)]
pub enum CoreError {
    #[display(fmt = "incompatible dimensions {:?} and {:?}", lhs, rhs)]
    IncompatibleDims { lhs: Vec<usize>, rhs: Vec<usize> },
    #[display(fmt = "index {} out of range for axis {} of extent {}", index, axis, extent)]
    IndexOutOfRange { axis: usize, index: i64, extent: usize },
    #[display(fmt = "{} subscripts given for a value of rank {}", given, rank)]
    WrongSubscriptCount { given: usize, rank: usize },
    #[display(fmt = "output axis {} is the target of more than one redirect", target)]
    DuplicateRedirect { target: usize },
    #[display(fmt = "redirect target {} lies beyond output rank {}", target, rank)]
    RedirectOutOfRange { target: usize, rank: usize },
    #[display(fmt = "unsupported subscript combination: {}", reason)]
    UnsupportedCombination { reason: &'static str },
    #[display(fmt = "{} is not defined for type {}", operation, tag)]
    UnsupportedType { operation: &'static str, tag: TypeTag },
    #[display(fmt = "{} expects {}, got {}", operation, expected, found)]
    WrongKind { operation: &'static str, expected: &'static str, found: &'static str },
    #[display(fmt = "cannot reshape {} elements into {}", available, requested)]
    SizeTooLarge { requested: usize, available: usize },
    #[display(fmt = "could not allocate {} elements", elements)]
    AllocationFailed { elements: usize },
    #[display(fmt = "invalid dimensions {:?}", dims)]
    InvalidDims { dims: Vec<usize> },
    #[display(fmt = "invalid loop axes {:?} for rank {}", axes, rank)]
    InvalidAxes { axes: Vec<usize>, rank: usize },
    #[display(fmt = "unknown symbol {:?}", _0)]
    UnknownSymbol(Symbol),
    #[display(fmt = "i/o failure at byte {}: {}", offset, message)]
    IoFailure { kind: std::io::ErrorKind, offset: u64, message: String },
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::IoFailure { kind: e.kind(), offset: 0, message: e.to_string() }
    }
}

impl CoreError {
    pub(crate) fn io_at(e: std::io::Error, offset: u64) -> Self {
        CoreError::IoFailure { kind: e.kind(), offset, message: e.to_string() }
    }

    pub(crate) fn wrong_kind(operation: &'static str, expected: &'static str, found: &Value) -> Self {
        CoreError::WrongKind { operation, expected, found: found.kind_name() }
    }
}
