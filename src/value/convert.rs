use crate::common::*;

use super::{read_as, SymbolTable};

/// Result type of a binary numeric operation on `a` and `b`.
pub fn promote(a: TypeTag, b: TypeTag) -> TypeTag {
    a.promote(b)
}

/// Converts `count` elements of `from` in `src` into `to` elements in `dst`.
pub(crate) fn convert_into(from: TypeTag, src: &[u8], to: TypeTag, dst: &mut [u8], count: usize) {
    dispatch_numeric!(to, T => {
        for idx in 0..count {
            read_as::<T>(from, src, idx).write(dst, idx);
        }
    })
}

/// Same as `convert_into`, for two types of equal element width sharing
/// one buffer. Each element is read before its slot is overwritten.
pub(crate) fn convert_in_place(data: &mut [u8], from: TypeTag, to: TypeTag, count: usize) {
    debug_assert_eq!(from.size(), to.size());
    dispatch_numeric!(to, T => {
        for idx in 0..count {
            let v = read_as::<T>(from, data, idx);
            v.write(data, idx);
        }
    })
}

impl SymbolTable {
    /// Returns a value of type `target` holding the elements of `symbol`.
    /// The same symbol comes back when no conversion is needed, or when a
    /// free temporary could be converted inside its own buffer.
    pub fn convert(&mut self, symbol: Symbol, target: TypeTag) -> CoreResult<Symbol> {
        if !target.is_numeric() {
            return Err(CoreError::UnsupportedType { operation: "conversion", tag: target });
        }
        let value = self.value(symbol)?;
        let (from, count) = match value.numeric_bytes() {
            Some((tag, bytes)) => (tag, bytes.len() / tag.size()),
            None => return Err(CoreError::wrong_kind("convert", "a numeric value", value)),
        };
        if from == target {
            return Ok(symbol);
        }

        if self.is_free_temp(symbol) && from.size() == target.size() {
            let (_, mut data) = self.take_numeric(symbol)?;
            convert_in_place(&mut data, from, target, count);
            self.install_numeric(symbol, target, data)?;
            log!(self.logger, "convert {:?} {} -> {} in place", symbol, from, target);
            return Ok(symbol);
        }

        let out = self.clone_shape(symbol, target)?;
        let (_, mut data) = self.take_numeric(out)?;
        if let Some((_, src)) = self.value(symbol)?.numeric_bytes() {
            convert_into(from, src, target, &mut data, count);
        }
        self.install_numeric(out, target, data)?;
        log!(self.logger, "convert {:?} {} -> {} into {:?}", symbol, from, target, out);
        Ok(out)
    }
}
