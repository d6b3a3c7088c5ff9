use crate::common::*;
use crate::engine::dim_loop::{DimensionLoop, LoopLevel, LoopMode};
use crate::value::{promote, read_as, SymbolTable};

macro_rules! debug_log {
    ($format:literal) => {
        enabled_debug_print!(false, "broadcast", $format);
    };
    ($format:literal, $($args:expr),*) => {
        enabled_debug_print!(false, "broadcast", $format, $($args),*);
    };
}

/// Elementwise binary operator. Implementors supply `apply`; the run
/// variants have default loops but may be overridden with faster ones.
pub trait BinaryOp {
    fn name(&self) -> &'static str;

    /// Whether the operator is defined on (promoted) element type `tag`.
    fn supports(&self, tag: TypeTag) -> bool {
        tag.is_numeric()
    }

    fn apply<T: Numeric>(&self, a: T, b: T) -> T;

    /// Both operands advance along the run.
    fn ordinary<T: Numeric>(&self, run: &mut Run) {
        for i in 0..run.len() {
            let v = self.apply(run.lhs::<T>(i), run.rhs::<T>(i));
            run.set(i, v);
        }
    }

    /// The left operand is a single value repeated along the run.
    fn stretch_left<T: Numeric>(&self, run: &mut Run) {
        let a = run.lhs::<T>(0);
        for i in 0..run.len() {
            let v = self.apply(a, run.rhs::<T>(i));
            run.set(i, v);
        }
    }

    /// The right operand is a single value repeated along the run.
    fn stretch_right<T: Numeric>(&self, run: &mut Run) {
        let b = run.rhs::<T>(0);
        for i in 0..run.len() {
            let v = self.apply(run.lhs::<T>(i), b);
            run.set(i, v);
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum Operand<'a> {
    Buffer { tag: TypeTag, data: &'a [u8] },
    // The operand's buffer is the one being written.
    Result { tag: TypeTag },
}

/// One run of elements handed to a `BinaryOp`. Reads convert to the
/// operator's element type; writes go to the result buffer.
pub struct Run<'a> {
    out: &'a mut [u8],
    lhs: Operand<'a>,
    rhs: Operand<'a>,
    // out, lhs, rhs
    cursors: [usize; 3],
    strides: [usize; 3],
    len: usize,
}

impl<'a> Run<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lhs<T: Element>(&self, i: usize) -> T {
        self.read(self.lhs, 1, i)
    }

    pub fn rhs<T: Element>(&self, i: usize) -> T {
        self.read(self.rhs, 2, i)
    }

    pub fn set<T: Element>(&mut self, i: usize, v: T) {
        v.write(self.out, self.cursors[0] + i * self.strides[0]);
    }

    fn read<T: Element>(&self, operand: Operand, slot: usize, i: usize) -> T {
        let index = self.cursors[slot] + i * self.strides[slot];
        match operand {
            Operand::Buffer { tag, data } => read_as(tag, data, index),
            Operand::Result { tag } => read_as(tag, &self.out[..], index),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum ActionKind {
    Ordinary,
    ScalarLeft,
    ScalarRight,
}

/// One segment of the broadcasting plan: `count` repeats, with the element
/// stride each buffer moves per repeat.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct Action {
    pub kind: ActionKind,
    pub count: usize,
    pub out_stride: usize,
    pub lhs_stride: usize,
    pub rhs_stride: usize,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct BroadcastPlan {
    pub actions: Vec<Action>,
    pub out_dims: Vec<usize>,
    /// No axis is stretched: plain elementwise.
    pub fast_path: bool,
}

/// Classifies the axis pairs of two shapes and coalesces consecutive
/// ordinary axes into single actions.
pub(crate) fn plan(lhs_dims: &[usize], rhs_dims: &[usize]) -> CoreResult<BroadcastPlan> {
    let incompatible = || CoreError::IncompatibleDims { lhs: lhs_dims.to_vec(), rhs: rhs_dims.to_vec() };
    let ndim = lhs_dims.len().min(rhs_dims.len());
    let longer = if lhs_dims.len() >= rhs_dims.len() { lhs_dims } else { rhs_dims };
    if longer[ndim..].iter().any(|&d| d != 1) {
        return Err(incompatible());
    }

    let out_dims = (0..ndim)
        .map(|axis| lhs_dims[axis].max(rhs_dims[axis]))
        .chain(longer[ndim..].iter().copied())
        .collect::<Vec<_>>();
    let out_strides = natural_strides(&out_dims);
    let lhs_strides = natural_strides(lhs_dims);
    let rhs_strides = natural_strides(rhs_dims);

    let mut actions: Vec<Action> = Vec::with_capacity(ndim);
    for axis in 0..ndim {
        let (l, r) = (lhs_dims[axis], rhs_dims[axis]);
        let (kind, lhs_stride, rhs_stride) = if l == r {
            (ActionKind::Ordinary, lhs_strides[axis], rhs_strides[axis])
        } else if l == 1 {
            (ActionKind::ScalarLeft, 0, rhs_strides[axis])
        } else if r == 1 {
            (ActionKind::ScalarRight, lhs_strides[axis], 0)
        } else {
            return Err(incompatible());
        };
        let count = l.max(r);
        match actions.last_mut() {
            // consecutive ordinary axes are contiguous in all three buffers
            Some(last) if kind == ActionKind::Ordinary && last.kind == ActionKind::Ordinary => {
                last.count *= count;
            },
            _ => actions.push(Action {
                kind,
                count,
                out_stride: out_strides[axis],
                lhs_stride,
                rhs_stride,
            }),
        }
    }
    let fast_path = actions.iter().all(|a| a.kind == ActionKind::Ordinary);
    Ok(BroadcastPlan { actions, out_dims, fast_path })
}

#[derive(Debug, Clone)]
struct Shape {
    tag: TypeTag,
    dims: Vec<usize>,
    scalar: bool,
}

fn operand_shape<O: BinaryOp>(table: &SymbolTable, symbol: Symbol, op: &O) -> CoreResult<Shape> {
    match table.value(symbol)? {
        Value::Scalar(v) => Ok(Shape { tag: v.tag(), dims: Vec::new(), scalar: true }),
        Value::Array(v) => Ok(Shape { tag: v.tag(), dims: v.dims().to_vec(), scalar: false }),
        Value::Str(_) => Err(CoreError::UnsupportedType { operation: op.name(), tag: TypeTag::StringScalar }),
        Value::StrArray(_) => Err(CoreError::UnsupportedType { operation: op.name(), tag: TypeTag::StringArray }),
        other => Err(CoreError::wrong_kind(op.name(), "a numeric value", other)),
    }
}

fn operand<'t>(table: &'t SymbolTable, symbol: Symbol, result: Symbol, result_tag: TypeTag) -> CoreResult<Operand<'t>> {
    if symbol == result {
        return Ok(Operand::Result { tag: result_tag });
    }
    let value = table.value(symbol)?;
    match value.numeric_bytes() {
        Some((tag, data)) => Ok(Operand::Buffer { tag, data }),
        None => Err(CoreError::wrong_kind("broadcast", "a numeric value", value)),
    }
}

/// Evaluates `lhs op rhs` elementwise, stretching extent-1 axes (and scalar
/// operands) across the other operand. The result has the promoted type of
/// the two operands and may reuse the buffer of an operand that is a free
/// temporary; every check happens before any element is written.
pub fn apply_binop<O: BinaryOp>(table: &mut SymbolTable, lhs: Symbol, rhs: Symbol, op: &O) -> CoreResult<Symbol> {
    let mut lhs_shape = operand_shape(table, lhs, op)?;
    let mut rhs_shape = operand_shape(table, rhs, op)?;
    let promoted = promote(lhs_shape.tag, rhs_shape.tag);
    if !op.supports(promoted) {
        return Err(CoreError::UnsupportedType { operation: op.name(), tag: promoted });
    }

    // a scalar is stretched over every axis of the other operand
    let out_scalar = lhs_shape.scalar && rhs_shape.scalar;
    let rank = lhs_shape.dims.len().max(rhs_shape.dims.len()).max(1);
    for shape in [&mut lhs_shape, &mut rhs_shape].iter_mut() {
        if shape.scalar {
            shape.dims = vec![1; rank];
        }
    }
    let plan = plan(&lhs_shape.dims, &rhs_shape.dims)?;
    debug_log!("plan {:?}", plan);

    // settle where the result goes before touching any buffer
    let reusable = |shape: &Shape, symbol: Symbol| {
        table.config.reuse_buffers
            && shape.tag.size() == promoted.size()
            && shape.scalar == out_scalar
            && shape.dims == plan.out_dims
            && table.is_free_temp(symbol)
    };
    let reused = if reusable(&lhs_shape, lhs) {
        Some(lhs)
    } else if reusable(&rhs_shape, rhs) {
        Some(rhs)
    } else {
        None
    };
    let result = match reused {
        Some(symbol) => symbol,
        None if out_scalar => table.alloc_scalar(promoted)?,
        None => table.alloc_array(promoted, &plan.out_dims)?,
    };
    log!(
        table.logger,
        "{} {:?} {:?} -> {:?} {} {:?}{}",
        op.name(),
        lhs,
        rhs,
        result,
        promoted,
        plan.out_dims,
        if reused.is_some() { " (reused)" } else { "" }
    );

    let (result_tag, mut out) = table.take_numeric(result)?;
    let operands = operand(table, lhs, result, result_tag)
        .and_then(|l| operand(table, rhs, result, result_tag).map(|r| (l, r)));
    let (lhs_op, rhs_op) = match operands {
        Ok(pair) => pair,
        Err(e) => {
            table.install_numeric(result, result_tag, out)?;
            return Err(e);
        },
    };

    let levels = plan
        .actions
        .iter()
        .map(|a| LoopLevel { count: a.count, strides: vec![a.out_stride, a.lhs_stride, a.rhs_stride] })
        .collect::<Vec<_>>();
    let mode = if table.config.collapse_runs { LoopMode::EachContiguousRun } else { LoopMode::EachElement };
    let mut lp = DimensionLoop::with_levels(&levels, 3, mode);
    let strides = [lp.run_stride(0), lp.run_stride(1), lp.run_stride(2)];
    let len = lp.run_len();
    let kind = if plan.fast_path {
        ActionKind::Ordinary
    } else if len > 1 && strides[1] == 0 && strides[2] != 0 {
        ActionKind::ScalarLeft
    } else if len > 1 && strides[2] == 0 && strides[1] != 0 {
        ActionKind::ScalarRight
    } else {
        ActionKind::Ordinary
    };

    dispatch_numeric!(promoted, T => {
        let mut cursors = [0usize; 3];
        loop {
            let mut run = Run { out: &mut out, lhs: lhs_op, rhs: rhs_op, cursors, strides, len };
            match kind {
                ActionKind::Ordinary => op.ordinary::<T>(&mut run),
                ActionKind::ScalarLeft => op.stretch_left::<T>(&mut run),
                ActionKind::ScalarRight => op.stretch_right::<T>(&mut run),
            }
            if lp.advance(&mut cursors) == 0 {
                break;
            }
        }
    });

    table.install_numeric(result, promoted, out)?;
    Ok(result)
}

//------------------------------------------------------------------------------
// Built-in operators
//------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone)]
pub struct Add;
#[derive(Debug, Copy, Clone)]
pub struct Subtract;
#[derive(Debug, Copy, Clone)]
pub struct Multiply;
#[derive(Debug, Copy, Clone)]
pub struct Divide;
#[derive(Debug, Copy, Clone)]
pub struct Min;
#[derive(Debug, Copy, Clone)]
pub struct Max;
#[derive(Debug, Copy, Clone)]
pub struct BitAnd;
#[derive(Debug, Copy, Clone)]
pub struct BitOr;

impl BinaryOp for Add {
    fn name(&self) -> &'static str { "+" }
    fn apply<T: Numeric>(&self, a: T, b: T) -> T { a.add(b) }
}
impl BinaryOp for Subtract {
    fn name(&self) -> &'static str { "-" }
    fn apply<T: Numeric>(&self, a: T, b: T) -> T { a.sub(b) }
}
impl BinaryOp for Multiply {
    fn name(&self) -> &'static str { "*" }
    fn apply<T: Numeric>(&self, a: T, b: T) -> T { a.mul(b) }
}
impl BinaryOp for Divide {
    fn name(&self) -> &'static str { "/" }
    fn apply<T: Numeric>(&self, a: T, b: T) -> T { a.div(b) }
}
impl BinaryOp for Min {
    fn name(&self) -> &'static str { "min" }
    fn supports(&self, tag: TypeTag) -> bool { tag.is_numeric() && !tag.is_complex() }
    fn apply<T: Numeric>(&self, a: T, b: T) -> T { a.min(b) }
}
impl BinaryOp for Max {
    fn name(&self) -> &'static str { "max" }
    fn supports(&self, tag: TypeTag) -> bool { tag.is_numeric() && !tag.is_complex() }
    fn apply<T: Numeric>(&self, a: T, b: T) -> T { a.max(b) }
}
impl BinaryOp for BitAnd {
    fn name(&self) -> &'static str { "and" }
    fn supports(&self, tag: TypeTag) -> bool { tag.is_integer() }
    fn apply<T: Numeric>(&self, a: T, b: T) -> T { a.bit_and(b) }
}
impl BinaryOp for BitOr {
    fn name(&self) -> &'static str { "or" }
    fn supports(&self, tag: TypeTag) -> bool { tag.is_integer() }
    fn apply<T: Numeric>(&self, a: T, b: T) -> T { a.bit_or(b) }
}
