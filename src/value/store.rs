use crate::common::*;

use super::value::*;

/// Whether a symbol is a user-visible binding or an anonymous temporary
/// created while evaluating an expression.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Binding {
    Named,
    Temp,
}

/// Ownership state of a symbol. `Free -> Embedded` happens once, when the
/// symbol becomes an element of a compound. `Free <-> Protected` is toggled
/// by `protect`/`unprotect` and nests.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TempState {
    Free,
    Embedded(Symbol),
    Protected(u32),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    binding: Binding,
    state: TempState,
    name: Option<String>,
}

#[derive(Debug)]
struct SlotEntry {
    generation: u32,
    slot: Option<Slot>,
}

/// Arena of every value in the interpreter session. All buffer mutation
/// goes through here, so `is_free_temp` is the single source of truth for
/// whether a buffer may be reused.
#[derive(Debug)]
pub struct SymbolTable {
    entries: Vec<SlotEntry>,
    // Released slot indices, reused before the arena grows.
    free_slots: VecDeque<u32>,
    names: HashMap<String, Symbol>,
    // The one outstanding alias that may pin a temporary against reuse.
    pipe: Option<Symbol>,
    pub(crate) config: CoreConfig,
    pub(crate) logger: Box<dyn Logger>,
}

impl SymbolTable {
    pub fn new(config: CoreConfig, logger: Box<dyn Logger>) -> Self {
        Self {
            entries: Vec::with_capacity(64),
            free_slots: VecDeque::new(),
            names: HashMap::new(),
            pipe: None,
            config,
            logger,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    //--------------------------------------------------------------------------
    // Slot management
    //--------------------------------------------------------------------------

    fn slot(&self, symbol: Symbol) -> CoreResult<&Slot> {
        self.entries
            .get(symbol.index as usize)
            .filter(|entry| entry.generation == symbol.generation)
            .and_then(|entry| entry.slot.as_ref())
            .ok_or(CoreError::UnknownSymbol(symbol))
    }

    fn slot_mut(&mut self, symbol: Symbol) -> CoreResult<&mut Slot> {
        self.entries
            .get_mut(symbol.index as usize)
            .filter(|entry| entry.generation == symbol.generation)
            .and_then(|entry| entry.slot.as_mut())
            .ok_or(CoreError::UnknownSymbol(symbol))
    }

    fn insert(&mut self, value: Value, binding: Binding, name: Option<String>) -> Symbol {
        let slot = Slot { value, binding, state: TempState::Free, name };
        if let Some(index) = self.free_slots.pop_back() {
            let entry = &mut self.entries[index as usize];
            entry.generation = entry.generation.wrapping_add(1);
            entry.slot = Some(slot);
            Symbol::new(index, entry.generation)
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(SlotEntry { generation: 0, slot: Some(slot) });
            Symbol::new(index, 0)
        }
    }

    /// Removes the slot without touching the symbols its value owns.
    fn remove(&mut self, symbol: Symbol) -> CoreResult<Slot> {
        self.slot(symbol)?;
        let slot = self.entries[symbol.index as usize]
            .slot
            .take()
            .ok_or(CoreError::UnknownSymbol(symbol))?;
        self.free_slots.push_back(symbol.index);
        if let Some(name) = &slot.name {
            if self.names.get(name) == Some(&symbol) {
                self.names.remove(name);
            }
        }
        if self.pipe == Some(symbol) {
            self.pipe = None;
        }
        Ok(slot)
    }

    fn adopt_children(&mut self, parent: Symbol) -> CoreResult<()> {
        for child in self.slot(parent)?.value.owned_symbols() {
            self.slot_mut(child)?.state = TempState::Embedded(parent);
        }
        Ok(())
    }

    fn is_ancestor(&self, candidate: Symbol, mut of: Symbol) -> bool {
        loop {
            if of == candidate {
                return true;
            }
            match self.slot(of).map(|s| s.state) {
                Ok(TempState::Embedded(parent)) => of = parent,
                _ => return false,
            }
        }
    }

    fn check_dims(&self, dims: &[usize]) -> CoreResult<usize> {
        if dims.is_empty() || dims.len() > self.config.max_dims || dims.contains(&0) {
            return Err(CoreError::InvalidDims { dims: dims.to_vec() });
        }
        let count = element_count(dims).ok_or(CoreError::AllocationFailed { elements: usize::MAX })?;
        if count > self.config.max_elements {
            return Err(CoreError::AllocationFailed { elements: count });
        }
        Ok(count)
    }

    pub(crate) fn alloc_buffer(&self, elements: usize, tag: TypeTag) -> CoreResult<Vec<u8>> {
        let bytes = elements
            .checked_mul(tag.size())
            .ok_or(CoreError::AllocationFailed { elements })?;
        let mut data = Vec::new();
        data.try_reserve_exact(bytes).map_err(|_| CoreError::AllocationFailed { elements })?;
        data.resize(bytes, 0);
        Ok(data)
    }

    //--------------------------------------------------------------------------
    // Allocation of temporaries
    //--------------------------------------------------------------------------

    /// Registers an already built value as a fresh temporary.
    pub fn alloc_value(&mut self, value: Value) -> Symbol {
        let symbol = self.insert(value, Binding::Temp, None);
        log!(self.logger, "alloc temp {:?}", symbol);
        symbol
    }

    pub fn alloc_scalar(&mut self, tag: TypeTag) -> CoreResult<Symbol> {
        if !tag.is_numeric() {
            return Err(CoreError::UnsupportedType { operation: "scalar allocation", tag });
        }
        Ok(self.alloc_value(Value::Scalar(ScalarValue::zeroed(tag))))
    }

    /// Allocates a zero-filled array temporary.
    pub fn alloc_array(&mut self, tag: TypeTag, dims: &[usize]) -> CoreResult<Symbol> {
        if !tag.is_numeric() {
            return Err(CoreError::UnsupportedType { operation: "array allocation", tag });
        }
        let count = self.check_dims(dims)?;
        let data = self.alloc_buffer(count, tag)?;
        let symbol = self.insert(Value::Array(ArrayValue { tag, dims: dims.to_vec(), data }), Binding::Temp, None);
        log!(self.logger, "alloc temp {:?} {} {:?}", symbol, tag, dims);
        Ok(symbol)
    }

    pub fn alloc_string(&mut self, text: &[u8]) -> Symbol {
        self.alloc_value(Value::Str(text.to_vec()))
    }

    /// Allocates an array of empty strings.
    pub fn alloc_string_array(&mut self, dims: &[usize]) -> CoreResult<Symbol> {
        let count = self.check_dims(dims)?;
        let mut items = Vec::new();
        items.try_reserve_exact(count).map_err(|_| CoreError::AllocationFailed { elements: count })?;
        items.resize(count, Vec::new());
        Ok(self.alloc_value(Value::StrArray(StrArrayValue { dims: dims.to_vec(), items })))
    }

    pub fn alloc_compound(&mut self) -> Symbol {
        self.alloc_value(Value::Compound(Vec::new()))
    }

    pub fn alloc_range(&mut self, range: RangeSpec) -> Symbol {
        self.alloc_value(Value::Range(range))
    }

    pub fn alloc_subscript(&mut self, range: RangeSpec) -> Symbol {
        self.alloc_value(Value::Subscript(range))
    }

    pub fn alloc_filemap(&mut self, map: FileMap) -> CoreResult<Symbol> {
        if !map.tag.is_numeric() {
            return Err(CoreError::UnsupportedType { operation: "file map", tag: map.tag });
        }
        self.check_dims(&map.dims)?;
        Ok(self.alloc_value(Value::FileMap(map)))
    }

    pub fn scalar_from<T: Element>(&mut self, v: T) -> Symbol {
        self.alloc_value(Value::Scalar(ScalarValue::new(v)))
    }

    pub fn array_from<T: Element>(&mut self, dims: &[usize], elements: &[T]) -> CoreResult<Symbol> {
        let count = self.check_dims(dims)?;
        if count != elements.len() {
            return Err(CoreError::InvalidDims { dims: dims.to_vec() });
        }
        let symbol = self.alloc_array(T::TAG, dims)?;
        if let Value::Array(array) = &mut self.slot_mut(symbol)?.value {
            for (idx, v) in elements.iter().enumerate() {
                v.write(&mut array.data, idx);
            }
        }
        Ok(symbol)
    }

    /// New temporary with the dims of `symbol` and the given type. Data is
    /// not copied.
    pub fn clone_shape(&mut self, symbol: Symbol, tag: TypeTag) -> CoreResult<Symbol> {
        let value = &self.slot(symbol)?.value;
        match value {
            Value::Scalar(_) if tag.is_numeric() => self.alloc_scalar(tag),
            Value::Scalar(_) => self.alloc_string_array(&[1]),
            Value::Array(_) | Value::FileMap(_) | Value::StrArray(_) => {
                let dims = value.dims().unwrap_or_default();
                if tag == TypeTag::StringArray {
                    self.alloc_string_array(&dims)
                } else {
                    self.alloc_array(tag, &dims)
                }
            },
            other => Err(CoreError::wrong_kind("clone_shape", "an array or scalar", other)),
        }
    }

    /// Deep copy into a fresh free temporary. Compound elements are copied
    /// one by one and owned by the copy.
    pub fn copy(&mut self, symbol: Symbol) -> CoreResult<Symbol> {
        let value = &self.slot(symbol)?.value;
        let copied = match value {
            Value::Array(array) => {
                let mut data = self.alloc_buffer(array.len(), array.tag)?;
                data.copy_from_slice(&array.data);
                Value::Array(ArrayValue { tag: array.tag, dims: array.dims.clone(), data })
            },
            Value::Compound(entries) => {
                let entries = entries.clone();
                let mut copied = Vec::with_capacity(entries.len());
                for entry in entries {
                    let child = self.copy(entry.value)?;
                    copied.push(CompoundEntry { key: entry.key, value: child });
                }
                let parent = self.alloc_value(Value::Compound(copied));
                self.adopt_children(parent)?;
                return Ok(parent);
            },
            other => other.clone(),
        };
        Ok(self.alloc_value(copied))
    }

    //--------------------------------------------------------------------------
    // Lifetime
    //--------------------------------------------------------------------------

    /// True iff `symbol` is a temporary that nobody else holds: not embedded
    /// in a compound, not protected and not the pipe symbol. Only these may
    /// have their buffers reused.
    pub fn is_free_temp(&self, symbol: Symbol) -> bool {
        match self.slot(symbol) {
            Ok(slot) => {
                slot.binding == Binding::Temp
                    && slot.state == TempState::Free
                    && self.pipe != Some(symbol)
            },
            Err(_) => false,
        }
    }

    /// Releases the value and every element it owns. Releasing an unknown or
    /// already released symbol does nothing, and so does releasing an element
    /// its compound still holds: it goes when the compound goes.
    pub fn release(&mut self, symbol: Symbol) {
        if let Ok(TempState::Embedded(parent)) = self.state(symbol) {
            let held = self.slot(parent).map_or(false, |p| p.value.owned_symbols().contains(&symbol));
            if held {
                log!(self.logger, "release {:?} skipped, owned by {:?}", symbol, parent);
                return;
            }
        }
        self.release_tree(symbol);
    }

    fn release_tree(&mut self, symbol: Symbol) {
        let owned = match self.slot(symbol) {
            Ok(slot) => slot.value.owned_symbols(),
            Err(_) => return,
        };
        for child in owned {
            let still_ours = matches!(
                self.slot(child).map(|s| s.state),
                Ok(TempState::Embedded(parent)) if parent == symbol
            );
            if still_ours {
                self.release_tree(child);
            }
        }
        if self.remove(symbol).is_ok() {
            log!(self.logger, "release {:?}", symbol);
        }
    }

    /// Makes `child` an element of the compound `parent`. A free temporary is
    /// moved in; anything else (a named value, an element of another
    /// compound, a protected temporary) is copied first. Returns the symbol
    /// that now lives inside `parent`.
    pub fn embed(&mut self, child: Symbol, parent: Symbol) -> CoreResult<Symbol> {
        self.push_member(parent, None, child)
    }

    pub fn push_member(&mut self, parent: Symbol, key: Option<&str>, child: Symbol) -> CoreResult<Symbol> {
        match &self.slot(parent)?.value {
            Value::Compound(_) => {},
            other => return Err(CoreError::wrong_kind("embed", "a compound", other)),
        }
        self.slot(child)?;
        let owned = if self.is_free_temp(child) && !self.is_ancestor(child, parent) {
            child
        } else {
            self.copy(child)?
        };
        self.slot_mut(owned)?.state = TempState::Embedded(parent);
        if let Value::Compound(entries) = &mut self.slot_mut(parent)?.value {
            entries.push(CompoundEntry { key: key.map(|k| k.to_string()), value: owned });
        }
        log!(self.logger, "embed {:?} into {:?}", owned, parent);
        Ok(owned)
    }

    /// Pins a temporary against reuse until the matching `unprotect`.
    pub fn protect(&mut self, symbol: Symbol) -> CoreResult<()> {
        let slot = self.slot_mut(symbol)?;
        slot.state = match slot.state {
            TempState::Free => TempState::Protected(1),
            TempState::Protected(depth) => TempState::Protected(depth + 1),
            embedded => embedded,
        };
        Ok(())
    }

    pub fn unprotect(&mut self, symbol: Symbol) -> CoreResult<()> {
        let slot = self.slot_mut(symbol)?;
        slot.state = match slot.state {
            TempState::Protected(1) => TempState::Free,
            TempState::Protected(depth) => TempState::Protected(depth - 1),
            other => other,
        };
        Ok(())
    }

    /// Runs `f` with `symbol` protected, unprotecting it afterwards even if
    /// `f` fails.
    pub fn protected<R, F>(&mut self, symbol: Symbol, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.protect(symbol)?;
        let result = f(self);
        // `f` may legitimately have released the symbol
        let _ = self.unprotect(symbol);
        Ok(result)
    }

    pub fn set_pipe(&mut self, symbol: Option<Symbol>) {
        self.pipe = symbol;
    }

    pub fn pipe(&self) -> Option<Symbol> {
        self.pipe
    }

    /// Reclaims every free temporary. Embedded elements go with their
    /// compound; protected temporaries and the pipe symbol survive.
    pub fn release_free_temps(&mut self) -> usize {
        let free = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry.slot.as_ref().map(|_| Symbol::new(index as u32, entry.generation))
            })
            .filter(|&symbol| self.is_free_temp(symbol))
            .collect::<Vec<_>>();
        for symbol in free.iter() {
            self.release(*symbol);
        }
        free.len()
    }

    //--------------------------------------------------------------------------
    // Named bindings
    //--------------------------------------------------------------------------

    /// Binds the value of `symbol` to `name`. A free temporary is moved,
    /// anything else is copied. Rebinding keeps the named symbol and
    /// releases its previous value.
    pub fn define(&mut self, name: &str, symbol: Symbol) -> CoreResult<Symbol> {
        let existing = self.names.get(name).copied();
        if existing == Some(symbol) {
            return Ok(symbol);
        }
        let source = if self.is_free_temp(symbol) { symbol } else { self.copy(symbol)? };
        let value = self.remove(source)?.value;

        let target = match existing {
            Some(target) => {
                let previous = std::mem::replace(&mut self.slot_mut(target)?.value, value);
                for child in previous.owned_symbols() {
                    self.release_tree(child);
                }
                target
            },
            None => {
                let target = self.insert(value, Binding::Named, Some(name.to_string()));
                self.names.insert(name.to_string(), target);
                target
            },
        };
        self.adopt_children(target)?;
        log!(self.logger, "define {} as {:?}", name, target);
        Ok(target)
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.names.get(name).copied()
    }

    pub fn undefine(&mut self, name: &str) -> bool {
        match self.names.get(name).copied() {
            Some(symbol) => { self.release(symbol); true },
            None => false,
        }
    }

    //--------------------------------------------------------------------------
    // Reshaping
    //--------------------------------------------------------------------------

    /// Reinterprets an array with new dims. Only same-size or shrinking
    /// reshapes are allowed; shrinking drops the tail of the buffer. Element
    /// bytes are never rewritten.
    pub fn redim(&mut self, symbol: Symbol, new_dims: &[usize]) -> CoreResult<()> {
        let requested = self.check_dims(new_dims)?;
        let slot = self.slot_mut(symbol)?;
        match &mut slot.value {
            Value::Array(array) => {
                let available = array.len();
                if requested > available {
                    return Err(CoreError::SizeTooLarge { requested, available });
                }
                array.data.truncate(requested * array.tag.size());
                array.dims = new_dims.to_vec();
                Ok(())
            },
            other => Err(CoreError::wrong_kind("redim", "an array", other)),
        }
    }

    //--------------------------------------------------------------------------
    // Accessors
    //--------------------------------------------------------------------------

    pub fn value(&self, symbol: Symbol) -> CoreResult<&Value> {
        Ok(&self.slot(symbol)?.value)
    }

    pub(crate) fn value_mut(&mut self, symbol: Symbol) -> CoreResult<&mut Value> {
        Ok(&mut self.slot_mut(symbol)?.value)
    }

    pub fn binding(&self, symbol: Symbol) -> CoreResult<Binding> {
        Ok(self.slot(symbol)?.binding)
    }

    pub fn state(&self, symbol: Symbol) -> CoreResult<TempState> {
        Ok(self.slot(symbol)?.state)
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.slot(symbol).is_ok()
    }

    pub fn live_symbols(&self) -> usize {
        self.entries.iter().filter(|e| e.slot.is_some()).count()
    }

    pub fn type_of(&self, symbol: Symbol) -> CoreResult<TypeTag> {
        let value = self.value(symbol)?;
        value.tag().ok_or_else(|| CoreError::wrong_kind("type_of", "a typed value", value))
    }

    pub fn dims(&self, symbol: Symbol) -> CoreResult<Vec<usize>> {
        let value = self.value(symbol)?;
        value.dims().ok_or_else(|| CoreError::wrong_kind("dims", "an array-like value", value))
    }

    /// All elements of a numeric scalar or array, converted to `T`.
    pub fn elements<T: Element>(&self, symbol: Symbol) -> CoreResult<Vec<T>> {
        let value = self.value(symbol)?;
        let (tag, bytes) = value
            .numeric_bytes()
            .ok_or_else(|| CoreError::wrong_kind("elements", "a numeric value", value))?;
        let count = bytes.len() / tag.size();
        Ok((0..count).map(|idx| super::read_as::<T>(tag, bytes, idx)).collect())
    }

    pub fn string(&self, symbol: Symbol) -> CoreResult<&[u8]> {
        match self.value(symbol)? {
            Value::Str(text) => Ok(text),
            other => Err(CoreError::wrong_kind("string", "a string", other)),
        }
    }

    pub fn members(&self, parent: Symbol) -> CoreResult<&[CompoundEntry]> {
        match self.value(parent)? {
            Value::Compound(entries) => Ok(entries),
            other => Err(CoreError::wrong_kind("members", "a compound", other)),
        }
    }

    pub fn member(&self, parent: Symbol, key: &str) -> CoreResult<Option<Symbol>> {
        Ok(self
            .members(parent)?
            .iter()
            .find(|e| e.key.as_deref() == Some(key))
            .map(|e| e.value))
    }

    /// Moves the numeric buffer of a scalar or array out of the table. Must
    /// be paired with `install_numeric`.
    pub(crate) fn take_numeric(&mut self, symbol: Symbol) -> CoreResult<(TypeTag, Vec<u8>)> {
        match &mut self.slot_mut(symbol)?.value {
            Value::Array(array) => Ok((array.tag, std::mem::take(&mut array.data))),
            Value::Scalar(scalar) => Ok((scalar.tag(), scalar.bytes().to_vec())),
            other => Err(CoreError::wrong_kind("take_numeric", "a numeric value", other)),
        }
    }

    /// Puts a numeric buffer back and rewrites the declared type.
    pub(crate) fn install_numeric(&mut self, symbol: Symbol, tag: TypeTag, data: Vec<u8>) -> CoreResult<()> {
        match &mut self.slot_mut(symbol)?.value {
            Value::Array(array) => {
                debug_assert_eq!(data.len(), element_count(&array.dims).unwrap_or(0) * tag.size());
                array.tag = tag;
                array.data = data;
                Ok(())
            },
            Value::Scalar(scalar) => {
                scalar.retag(tag);
                scalar.bytes_mut().copy_from_slice(&data[..tag.size()]);
                Ok(())
            },
            other => Err(CoreError::wrong_kind("install_numeric", "a numeric value", other)),
        }
    }
}
