use num_complex::Complex64;

use crate::collections::VecSet;
use crate::common::*;
use crate::engine::dim_loop::{DimensionLoop, LoopLevel, LoopMode};
use crate::engine::filemap::{FileGuard, FileProvider};
use crate::value::{read_as, RangeSpec, SymbolTable};

macro_rules! debug_log {
    ($format:literal) => {
        enabled_debug_print!(false, "subscript", $format);
    };
    ($format:literal, $($args:expr),*) => {
        enabled_debug_print!(false, "subscript", $format, $($args),*);
    };
}

/// Index array subscript: every element of `indices` selects one position.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FancySpec {
    pub indices: Symbol,
    pub redirect: Option<usize>,
    pub sum: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubscriptArg {
    Index(i64),
    Range(RangeSpec),
    Fancy(FancySpec),
}

/// Flags that apply to a whole subscript list.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Modifiers {
    /// Omitted trailing axes are taken whole.
    pub all_remaining: bool,
    /// Omitted trailing axes are taken at index 0.
    pub zero_fill_remaining: bool,
    /// Pair the index lists positionally.
    pub inner: bool,
    /// Take every combination of the index lists.
    pub outer: bool,
    /// Axes addressed by a single index (or summed) stay as extent-1 axes.
    pub keep_size1_dims: bool,
    /// A lone subscript addresses axis 0 instead of the flattened array.
    pub separate: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, derive_more::Display)]
enum Combination {
    #[display(fmt = "inner")]
    Inner,
    #[display(fmt = "outer")]
    Outer,
}

impl FancySpec {
    pub fn new(indices: Symbol) -> Self {
        Self { indices, redirect: None, sum: false }
    }
    pub fn redirect(mut self, axis: usize) -> Self {
        self.redirect = Some(axis);
        self
    }
    pub fn summed(mut self) -> Self {
        self.sum = true;
        self
    }
}

impl SubscriptArg {
    pub fn fancy(indices: Symbol) -> Self {
        SubscriptArg::Fancy(FancySpec::new(indices))
    }

    /// Interprets an evaluated subscript expression: a scalar is an index,
    /// a range or subscript spec is a range, an array is an index list.
    pub fn from_symbol(table: &SymbolTable, symbol: Symbol) -> CoreResult<Self> {
        match table.value(symbol)? {
            Value::Scalar(v) if v.tag().is_complex() => {
                Err(CoreError::UnsupportedType { operation: "subscript index", tag: v.tag() })
            },
            Value::Scalar(v) => Ok(SubscriptArg::Index(v.get::<i64>())),
            Value::Range(spec) | Value::Subscript(spec) => Ok(SubscriptArg::Range(*spec)),
            Value::Array(_) => Ok(SubscriptArg::fancy(symbol)),
            other => Err(CoreError::wrong_kind("subscript", "an index, range or index array", other)),
        }
    }
}

impl Modifiers {
    pub fn inner() -> Self {
        Self { inner: true, ..Default::default() }
    }
    pub fn outer() -> Self {
        Self { outer: true, ..Default::default() }
    }
}

//------------------------------------------------------------------------------
// Resolution of subscripts against a source shape
//------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SelectorKind {
    Index,
    Range,
    List,
}

/// One subscript resolved against its axis: the positions it selects, in
/// order, and the shape those positions form.
#[derive(Debug, Clone)]
struct Selector {
    kind: SelectorKind,
    positions: Vec<usize>,
    dims: Vec<usize>,
    redirect: Option<usize>,
    sum: bool,
}

fn resolve(table: &SymbolTable, arg: &SubscriptArg, axis: usize, extent: usize) -> CoreResult<Selector> {
    let out_of_range = |index: i64| CoreError::IndexOutOfRange { axis, index, extent };
    let checked = |index: i64| {
        if index < 0 || index >= extent as i64 {
            Err(out_of_range(index))
        } else {
            Ok(index as usize)
        }
    };
    let selector = match *arg {
        SubscriptArg::Index(index) => Selector {
            kind: SelectorKind::Index,
            positions: vec![checked(index)?],
            dims: Vec::new(),
            redirect: None,
            sum: false,
        },
        SubscriptArg::Range(spec) => {
            let (start, end) = spec.resolve(extent).map_err(out_of_range)?;
            Selector {
                kind: SelectorKind::Range,
                positions: (start..=end).collect(),
                dims: vec![end - start + 1],
                redirect: spec.redirect,
                sum: spec.sum,
            }
        },
        SubscriptArg::Fancy(spec) => {
            let value = table.value(spec.indices)?;
            let dims = match value {
                Value::Scalar(_) => vec![1],
                Value::Array(v) => v.dims().to_vec(),
                Value::Str(_) | Value::StrArray(_) => {
                    let tag = table.type_of(spec.indices)?;
                    return Err(CoreError::UnsupportedType { operation: "subscript index", tag });
                },
                other => return Err(CoreError::wrong_kind("subscript", "an index array", other)),
            };
            let tag = table.type_of(spec.indices)?;
            if tag.is_complex() {
                return Err(CoreError::UnsupportedType { operation: "subscript index", tag });
            }
            let positions = table
                .elements::<i64>(spec.indices)?
                .into_iter()
                .map(checked)
                .collect::<CoreResult<Vec<_>>>()?;
            Selector { kind: SelectorKind::List, positions, dims, redirect: spec.redirect, sum: spec.sum }
        },
    };
    if selector.sum && selector.redirect.is_some() {
        return Err(CoreError::UnsupportedCombination { reason: "sum on a redirected axis" });
    }
    Ok(selector)
}

/// Source axes the subscripts apply to: `(extent, element stride)`.
fn subscript_axes(dims: &[usize], given: usize, modifiers: &Modifiers) -> CoreResult<Vec<(usize, usize)>> {
    let rank = dims.len();
    if given == 0 || given > rank {
        return Err(CoreError::WrongSubscriptCount { given, rank });
    }
    let fills = modifiers.all_remaining || modifiers.zero_fill_remaining;
    let per_axis = given > 1 || rank == 1 || fills || modifiers.separate;
    if !per_axis {
        let total: usize = dims.iter().product();
        return Ok(vec![(total, 1)]);
    }
    if given < rank && !fills {
        return Err(CoreError::WrongSubscriptCount { given, rank });
    }
    Ok(dims.iter().copied().zip(natural_strides(dims)).collect())
}

//------------------------------------------------------------------------------
// Gather plan
//------------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct GatherLevel {
    src: Vec<usize>,
    out: Vec<usize>,
}

/// Element offsets to copy, as an odometer over levels (innermost first).
/// The source offset of a step is the sum of each level's `src` entry at its
/// current position, likewise for the output. The first `summed` levels are
/// reduced into one output element.
#[derive(Debug, Clone)]
struct Gather {
    levels: Vec<GatherLevel>,
    summed: usize,
    /// Empty for a scalar result.
    out_dims: Vec<usize>,
}

impl Gather {
    /// Calls `f(src, out, flush)` for every step; `flush` is set on the last
    /// step of each group of summed positions (always, without summation).
    fn walk<F>(&self, mut f: F) -> CoreResult<()>
    where
        F: FnMut(usize, usize, bool) -> CoreResult<()>,
    {
        let levels = self
            .levels
            .iter()
            .map(|l| LoopLevel { count: l.src.len(), strides: Vec::new() })
            .collect::<Vec<_>>();
        let mut lp = DimensionLoop::with_levels(&levels, 0, LoopMode::EachElement);
        let depth = lp.levels();
        loop {
            let coords = lp.coords();
            let src = self.levels.iter().zip(coords).map(|(l, &c)| l.src[c]).sum::<usize>();
            let out = self.levels.iter().zip(coords).map(|(l, &c)| l.out[c]).sum::<usize>();
            let remaining = lp.advance(&mut []);
            let flush = remaining == 0 || depth - remaining >= self.summed;
            f(src, out, flush)?;
            if remaining == 0 {
                return Ok(());
            }
        }
    }

    fn out_count(&self) -> usize {
        self.out_dims.iter().product()
    }
}

fn combination(selectors: &[Selector], modifiers: &Modifiers) -> CoreResult<Combination> {
    match (modifiers.inner, modifiers.outer) {
        (true, true) => Err(CoreError::UnsupportedCombination { reason: "inner together with outer" }),
        (true, false) => Ok(Combination::Inner),
        (false, true) => Ok(Combination::Outer),
        // a multi-dimensional index list would make the outer product explode
        (false, false) => Ok(
            if selectors.iter().any(|s| s.kind == SelectorKind::List && s.dims.len() > 1) {
                Combination::Inner
            } else {
                Combination::Outer
            },
        ),
    }
}

fn inner_gather(selectors: &[Selector], axes: &[(usize, usize)], keep: bool) -> CoreResult<Gather> {
    if selectors.iter().any(|s| s.redirect.is_some() || s.sum) {
        return Err(CoreError::UnsupportedCombination { reason: "redirect or sum in inner mode" });
    }
    let mut count = 1;
    let mut count_dims: Vec<usize> = vec![1];
    for s in selectors.iter().filter(|s| s.positions.len() > 1) {
        if count > 1 && s.positions.len() != count {
            return Err(CoreError::IncompatibleDims { lhs: count_dims, rhs: s.dims.clone() });
        }
        count = s.positions.len();
        count_dims = s.dims.clone();
    }
    let src = (0..count)
        .map(|j| {
            selectors
                .iter()
                .zip(axes)
                .map(|(s, &(_, stride))| {
                    let at = if s.positions.len() == 1 { 0 } else { j };
                    s.positions[at] * stride
                })
                .sum::<usize>()
        })
        .collect();
    let out_dims = match selectors
        .iter()
        .find(|s| s.kind == SelectorKind::List && s.dims.len() > 1 && s.positions.len() == count)
    {
        Some(s) => s.dims.clone(),
        None if count > 1 => vec![count],
        None if keep => vec![1],
        None => Vec::new(),
    };
    Ok(Gather { levels: vec![GatherLevel { src, out: (0..count).collect() }], summed: 0, out_dims })
}

fn outer_gather(selectors: &[Selector], axes: &[(usize, usize)], keep: bool) -> CoreResult<Gather> {
    // output axes contributed by each subscript
    let group_dims = selectors
        .iter()
        .map(|s| {
            if !s.sum && s.kind != SelectorKind::Index {
                s.dims.clone()
            } else if keep {
                vec![1]
            } else {
                Vec::new()
            }
        })
        .collect::<Vec<_>>();
    let rank = group_dims.iter().map(|d| d.len()).sum::<usize>();

    // redirected groups claim their target first, the rest fill in order
    let mut slots: Vec<Option<(usize, usize)>> = vec![None; rank];
    for (g, s) in selectors.iter().enumerate() {
        if let Some(target) = s.redirect {
            let width = group_dims[g].len();
            if target >= rank || width > rank - target {
                return Err(CoreError::RedirectOutOfRange { target, rank });
            }
            for a in 0..width {
                if slots[target + a].is_some() {
                    return Err(CoreError::DuplicateRedirect { target: target + a });
                }
                slots[target + a] = Some((g, a));
            }
        }
    }
    let mut open = (0..rank).filter(|&p| slots[p].is_none()).collect::<VecDeque<_>>();
    for (g, s) in selectors.iter().enumerate() {
        if s.redirect.is_none() {
            for a in 0..group_dims[g].len() {
                if let Some(p) = open.pop_front() {
                    slots[p] = Some((g, a));
                }
            }
        }
    }
    let mut out_dims = vec![1; rank];
    let mut placement = group_dims.iter().map(|d| vec![0; d.len()]).collect::<Vec<_>>();
    for (p, slot) in slots.iter().enumerate() {
        if let Some((g, a)) = *slot {
            out_dims[p] = group_dims[g][a];
            placement[g][a] = p;
        }
    }
    let out_strides = natural_strides(&out_dims);

    let level = |g: usize| -> GatherLevel {
        let s = &selectors[g];
        let stride = axes[g].1;
        let src = s.positions.iter().map(|p| p * stride).collect();
        let out = (0..s.positions.len())
            .map(|j| {
                if s.sum {
                    return 0;
                }
                let mut rem = j;
                group_dims[g]
                    .iter()
                    .zip(placement[g].iter())
                    .map(|(&d, &p)| {
                        let c = rem % d;
                        rem /= d;
                        c * out_strides[p]
                    })
                    .sum::<usize>()
            })
            .collect();
        GatherLevel { src, out }
    };
    // summed subscripts iterate fastest so each output element is one group
    let summed = selectors.iter().filter(|s| s.sum).count();
    let levels = (0..selectors.len())
        .filter(|&g| selectors[g].sum)
        .chain((0..selectors.len()).filter(|&g| !selectors[g].sum))
        .map(level)
        .collect();
    let out_dims = if rank == 0 { Vec::new() } else { out_dims };
    Ok(Gather { levels, summed, out_dims })
}

fn plan_gather(
    table: &mut SymbolTable,
    source: Symbol,
    dims: &[usize],
    args: &[SubscriptArg],
    modifiers: &Modifiers,
) -> CoreResult<Gather> {
    if modifiers.all_remaining && modifiers.zero_fill_remaining {
        return Err(CoreError::UnsupportedCombination { reason: "all-remaining together with zero-fill" });
    }
    let axes = subscript_axes(dims, args.len(), modifiers)?;
    let mut selectors = Vec::with_capacity(axes.len());
    for (axis, &(extent, _)) in axes.iter().enumerate() {
        let selector = match args.get(axis) {
            Some(arg) => resolve(table, arg, axis, extent)?,
            None if modifiers.all_remaining => resolve(table, &SubscriptArg::Range(RangeSpec::full()), axis, extent)?,
            None => resolve(table, &SubscriptArg::Index(0), axis, extent)?,
        };
        selectors.push(selector);
    }

    let mut targets = VecSet::with_capacity(selectors.len());
    for target in selectors.iter().filter_map(|s| s.redirect) {
        if !targets.push(target) {
            return Err(CoreError::DuplicateRedirect { target });
        }
    }

    let mode = combination(&selectors, modifiers)?;
    let gather = match mode {
        Combination::Inner => inner_gather(&selectors, &axes, modifiers.keep_size1_dims)?,
        Combination::Outer => outer_gather(&selectors, &axes, modifiers.keep_size1_dims)?,
    };
    log!(table.logger, "extract {:?}: {} mode, output {:?}", source, mode, gather.out_dims);
    debug_log!("gather {:?}", gather);
    Ok(gather)
}

//------------------------------------------------------------------------------
// Extraction
//------------------------------------------------------------------------------

enum Elements<'a> {
    Memory(&'a [u8]),
    File(&'a mut FileGuard),
}

impl Elements<'_> {
    fn read(&mut self, index: usize, size: usize, dst: &mut [u8]) -> CoreResult<()> {
        match self {
            Elements::Memory(data) => {
                dst[..size].copy_from_slice(&data[index * size..(index + 1) * size]);
                Ok(())
            },
            Elements::File(guard) => guard.read_element(index, dst),
        }
    }
}

fn fill_numeric(gather: &Gather, tag: TypeTag, mut elements: Elements, out: &mut [u8]) -> CoreResult<()> {
    let size = tag.size();
    if gather.summed == 0 {
        return gather.walk(|src, dst, _| elements.read(src, size, &mut out[dst * size..(dst + 1) * size]));
    }
    // accumulate in double precision, truncate on write-back
    let mut buf = [0u8; 16];
    let mut acc = Complex64::new(0.0, 0.0);
    gather.walk(|src, dst, flush| {
        elements.read(src, size, &mut buf)?;
        acc += read_as::<Complex64>(tag, &buf, 0);
        if flush {
            dispatch_numeric!(tag, T => T::from_complex(acc).write(out, dst));
            acc = Complex64::new(0.0, 0.0);
        }
        Ok(())
    })
}

fn extract_numeric(
    table: &mut SymbolTable,
    files: &dyn FileProvider,
    source: Symbol,
    tag: TypeTag,
    gather: &Gather,
) -> CoreResult<Symbol> {
    // the file is opened before anything is allocated and closed on return
    let mut guard = match table.value(source)? {
        Value::FileMap(map) => {
            let map = map.clone();
            Some(FileGuard::open(files, &map, &mut *table.logger)?)
        },
        _ => None,
    };
    let result = if gather.out_dims.is_empty() {
        table.alloc_scalar(tag)?
    } else {
        table.alloc_array(tag, &gather.out_dims)?
    };
    let (_, mut out) = table.take_numeric(result)?;
    let filled = match (guard.as_mut(), table.value(source)?.numeric_bytes()) {
        (Some(guard), _) => fill_numeric(gather, tag, Elements::File(guard), &mut out),
        (None, Some((_, data))) => fill_numeric(gather, tag, Elements::Memory(data), &mut out),
        (None, None) => unreachable!("numeric source without elements"),
    };
    if guard.is_some() {
        log!(table.logger, "closing file map of {:?}", source);
    }
    match filled {
        Ok(()) => {
            table.install_numeric(result, tag, out)?;
            Ok(result)
        },
        Err(e) => {
            table.release(result);
            Err(e)
        },
    }
}

fn extract_strings(table: &mut SymbolTable, source: Symbol, gather: &Gather) -> CoreResult<Symbol> {
    if gather.summed > 0 {
        return Err(CoreError::UnsupportedType { operation: "summation", tag: TypeTag::StringArray });
    }
    let mut picked = Vec::with_capacity(gather.out_count());
    if let Value::StrArray(v) = table.value(source)? {
        gather.walk(|src, dst, _| {
            picked.push((dst, v.items()[src].clone()));
            Ok(())
        })?;
    }
    if gather.out_dims.is_empty() {
        let text = picked.pop().map(|(_, t)| t).unwrap_or_default();
        return Ok(table.alloc_value(Value::Str(text)));
    }
    let result = table.alloc_string_array(&gather.out_dims)?;
    if let Value::StrArray(v) = table.value_mut(result)? {
        for (dst, text) in picked {
            v.items_mut()[dst] = text;
        }
    }
    Ok(result)
}

fn extract_compound(table: &mut SymbolTable, source: Symbol, gather: &Gather) -> CoreResult<Symbol> {
    if gather.summed > 0 {
        return Err(CoreError::wrong_kind("summation", "a numeric value", table.value(source)?));
    }
    let mut picked = Vec::with_capacity(gather.out_count());
    let entries = table.members(source)?;
    gather.walk(|src, dst, _| {
        picked.push((dst, entries[src].clone()));
        Ok(())
    })?;
    if gather.out_dims.is_empty() {
        return match picked.pop() {
            Some((_, entry)) => table.copy(entry.value),
            None => Ok(table.alloc_compound()),
        };
    }
    picked.sort_by_key(|&(dst, _)| dst);
    let result = table.alloc_compound();
    for (_, entry) in picked {
        let pushed = table
            .copy(entry.value)
            .and_then(|copied| table.push_member(result, entry.key.as_deref(), copied));
        if let Err(e) = pushed {
            table.release(result);
            return Err(e);
        }
    }
    Ok(result)
}

fn extract_from_string(table: &mut SymbolTable, source: Symbol, args: &[SubscriptArg]) -> CoreResult<Symbol> {
    if args.len() != 1 {
        return Err(CoreError::WrongSubscriptCount { given: args.len(), rank: 1 });
    }
    let text = table.string(source)?;
    let selector = resolve(table, &args[0], 0, text.len())?;
    if selector.sum {
        return Err(CoreError::UnsupportedType { operation: "summation", tag: TypeTag::StringScalar });
    }
    // an index list gathers bytes into a new string, not a byte array
    let bytes = selector.positions.iter().map(|&p| text[p]).collect::<Vec<_>>();
    Ok(table.alloc_string(&bytes))
}

/// Evaluates `source(subscripts...)` into a fresh temporary. Nothing in the
/// table changes on failure.
pub fn extract(
    table: &mut SymbolTable,
    files: &dyn FileProvider,
    source: Symbol,
    subscripts: &[SubscriptArg],
    modifiers: Modifiers,
) -> CoreResult<Symbol> {
    enum Kind {
        Numeric(TypeTag),
        Strings,
        Compound,
    }
    let value = table.value(source)?;
    let (kind, dims) = match value {
        Value::Str(_) => return extract_from_string(table, source, subscripts),
        Value::Scalar(v) => (Kind::Numeric(v.tag()), vec![1]),
        Value::Array(v) => (Kind::Numeric(v.tag()), v.dims().to_vec()),
        Value::FileMap(v) => (Kind::Numeric(v.tag), v.dims.clone()),
        Value::StrArray(v) => (Kind::Strings, v.dims().to_vec()),
        Value::Compound(entries) => (Kind::Compound, vec![entries.len()]),
        other => return Err(CoreError::wrong_kind("subscript", "an array, string or compound", other)),
    };
    if dims.contains(&0) {
        return Err(CoreError::IndexOutOfRange { axis: 0, index: 0, extent: 0 });
    }
    let gather = plan_gather(table, source, &dims, subscripts, &modifiers)?;
    match kind {
        Kind::Numeric(tag) => extract_numeric(table, files, source, tag, &gather),
        Kind::Strings => extract_strings(table, source, &gather),
        Kind::Compound => extract_compound(table, source, &gather),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(extent: usize) -> Selector {
        Selector {
            kind: SelectorKind::Range,
            positions: (0..extent).collect(),
            dims: vec![extent],
            redirect: None,
            sum: false,
        }
    }

    fn offsets(gather: &Gather) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        gather
            .walk(|s, d, _| {
                out.push((s, d));
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn single_subscript_flattens() {
        let modifiers = Modifiers::default();
        assert_eq!(subscript_axes(&[2, 3], 1, &modifiers).unwrap(), vec![(6, 1)]);
        let separate = Modifiers { separate: true, ..Default::default() };
        assert!(matches!(
            subscript_axes(&[2, 3], 1, &separate),
            Err(CoreError::WrongSubscriptCount { given: 1, rank: 2 })
        ));
        let fill = Modifiers { all_remaining: true, ..Default::default() };
        assert_eq!(subscript_axes(&[2, 3], 1, &fill).unwrap(), vec![(2, 1), (3, 2)]);
        assert!(subscript_axes(&[2, 3], 3, &modifiers).is_err());
    }

    #[test]
    fn redirect_transposes() {
        // [2, 3] source, axis 0 sent to output axis 1
        let mut first = full(2);
        first.redirect = Some(1);
        let gather = outer_gather(&[first, full(3)], &[(2, 1), (3, 2)], false).unwrap();
        assert_eq!(gather.out_dims, vec![3, 2]);
        let pairs = offsets(&gather);
        assert_eq!(pairs, vec![(0, 0), (1, 3), (2, 1), (3, 4), (4, 2), (5, 5)]);
    }

    #[test]
    fn summed_levels_come_first() {
        let mut summed = full(3);
        summed.sum = true;
        let gather = outer_gather(&[full(2), summed], &[(2, 1), (3, 2)], false).unwrap();
        assert_eq!(gather.out_dims, vec![2]);
        assert_eq!(gather.summed, 1);
        let mut flushes = Vec::new();
        gather
            .walk(|s, d, flush| {
                flushes.push((s, d, flush));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            flushes,
            vec![(0, 0, false), (2, 0, false), (4, 0, true), (1, 1, false), (3, 1, false), (5, 1, true)]
        );
    }
}
