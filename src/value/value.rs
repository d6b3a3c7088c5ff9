use std::path::PathBuf;

use crate::common::*;

/// One scalar element, stored with its declared type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarValue {
    tag: TypeTag,
    bits: [u8; 16],
}

/// Dense array: axis 0 varies fastest. `data` always holds exactly
/// `product(dims) * tag.size()` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub(crate) tag: TypeTag,
    pub(crate) dims: Vec<usize>,
    pub(crate) data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrArrayValue {
    pub(crate) dims: Vec<usize>,
    pub(crate) items: Vec<Vec<u8>>,
}

/// An element of a list or struct. The element symbol is owned by the
/// compound holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundEntry {
    pub key: Option<String>,
    pub value: Symbol,
}

/// A resolved `start:end` index descriptor. Both ends are inclusive and a
/// negative end counts from the end of the axis (`-1` is the last element).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: i64,
    pub end: i64,
    pub redirect: Option<usize>,
    pub sum: bool,
}

/// An array stored raw in a file: elements of `tag`, axis 0 fastest,
/// little-endian, starting at byte `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMap {
    pub path: PathBuf,
    pub tag: TypeTag,
    pub dims: Vec<usize>,
    pub offset: u64,
}

/// Represents a single language-level datum. Compound values refer to their
/// elements through symbols; releasing a compound must release those too.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(ScalarValue),
    Array(ArrayValue),
    Str(Vec<u8>),
    StrArray(StrArrayValue),
    Compound(Vec<CompoundEntry>),
    Range(RangeSpec),
    Subscript(RangeSpec),
    FileMap(FileMap),
}

impl ScalarValue {
    pub fn new<T: Element>(v: T) -> Self {
        let mut scalar = Self::zeroed(T::TAG);
        v.write(&mut scalar.bits, 0);
        scalar
    }

    pub fn zeroed(tag: TypeTag) -> Self {
        debug_assert!(tag.is_numeric());
        Self { tag, bits: [0; 16] }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Reads the element, converted to `T`.
    pub fn get<T: Element>(&self) -> T {
        crate::value::read_as(self.tag, &self.bits, 0)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bits[..self.tag.size()]
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        let size = self.tag.size();
        &mut self.bits[..size]
    }

    /// Rewrites the declared type without touching the bits.
    pub(crate) fn retag(&mut self, tag: TypeTag) {
        self.tag = tag;
    }
}

impl ArrayValue {
    pub fn tag(&self) -> TypeTag {
        self.tag
    }
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn len(&self) -> usize {
        self.data.len() / self.tag.size()
    }
    pub fn get<T: Element>(&self, index: usize) -> T {
        crate::value::read_as(self.tag, &self.data, index)
    }
}

impl StrArrayValue {
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }
    pub fn items(&self) -> &[Vec<u8>] {
        &self.items
    }
    pub fn items_mut(&mut self) -> &mut [Vec<u8>] {
        &mut self.items
    }
}

impl RangeSpec {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end, redirect: None, sum: false }
    }

    /// The whole axis.
    pub fn full() -> Self {
        Self::new(0, -1)
    }

    pub fn redirect(mut self, axis: usize) -> Self {
        self.redirect = Some(axis);
        self
    }

    pub fn summed(mut self) -> Self {
        self.sum = true;
        self
    }

    /// Resolves negative ends against `extent`, returning the inclusive
    /// `(start, end)` pair if it lies inside the axis. On failure the
    /// offending (unresolved) endpoint is returned.
    pub fn resolve(&self, extent: usize) -> Result<(usize, usize), i64> {
        let resolve_one = |given: i64| -> Result<usize, i64> {
            let effective = if given < 0 { extent as i64 + given } else { given };
            if effective < 0 || effective >= extent as i64 {
                Err(given)
            } else {
                Ok(effective as usize)
            }
        };
        let start = resolve_one(self.start)?;
        let end = resolve_one(self.end)?;
        if start > end {
            return Err(self.end);
        }
        Ok((start, end))
    }
}

impl FileMap {
    pub fn new<P: Into<PathBuf>>(path: P, tag: TypeTag, dims: &[usize]) -> Self {
        Self { path: path.into(), tag, dims: dims.to_vec(), offset: 0 }
    }

    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Array(_) => "array",
            Value::Str(_) => "string",
            Value::StrArray(_) => "string array",
            Value::Compound(_) => "compound",
            Value::Range(_) => "range",
            Value::Subscript(_) => "subscript",
            Value::FileMap(_) => "file map",
        }
    }

    /// Element type, for the variants that have one.
    pub fn tag(&self) -> Option<TypeTag> {
        match self {
            Value::Scalar(v) => Some(v.tag),
            Value::Array(v) => Some(v.tag),
            Value::Str(_) => Some(TypeTag::StringScalar),
            Value::StrArray(_) => Some(TypeTag::StringArray),
            Value::FileMap(v) => Some(v.tag),
            _ => None,
        }
    }

    /// Dimensions of array-like variants. A scalar or string counts as a
    /// single element of rank 1; strings report their length.
    pub fn dims(&self) -> Option<Vec<usize>> {
        match self {
            Value::Scalar(_) => Some(vec![1]),
            Value::Array(v) => Some(v.dims.clone()),
            Value::Str(v) => Some(vec![v.len()]),
            Value::StrArray(v) => Some(v.dims.clone()),
            Value::FileMap(v) => Some(v.dims.clone()),
            Value::Compound(v) => Some(vec![v.len()]),
            _ => None,
        }
    }

    /// Symbols owned by this value.
    pub(crate) fn owned_symbols(&self) -> Vec<Symbol> {
        match self {
            Value::Compound(entries) => entries.iter().map(|e| e.value).collect(),
            _ => Vec::new(),
        }
    }

    /// Raw numeric bytes of a scalar or array, with their type.
    pub(crate) fn numeric_bytes(&self) -> Option<(TypeTag, &[u8])> {
        match self {
            Value::Scalar(v) => Some((v.tag, v.bytes())),
            Value::Array(v) => Some((v.tag, &v.data)),
            _ => None,
        }
    }
}
