use crate::collections::VecSet;
use crate::common::*;

macro_rules! debug_log {
    ($format:literal) => {
        enabled_debug_print!(false, "dim_loop", $format);
    };
    ($format:literal, $($args:expr),*) => {
        enabled_debug_print!(false, "dim_loop", $format, $($args),*);
    };
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopMode {
    /// Every `advance` moves the cursors by one element.
    EachElement,
    /// Leading levels that form a regular progression for every cursor are
    /// merged into a run; every `advance` moves the cursors by one run.
    EachContiguousRun,
}

/// One level of the loop odometer: how many positions it has, and how far
/// (in elements) each cursor moves per position.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoopLevel {
    pub count: usize,
    pub strides: Vec<usize>,
}

/// Odometer over a set of loop levels, innermost first, moving any number of
/// element cursors in lock-step. Each cursor has its own stride per level, so
/// arrays with different layouts (or a stretched operand with stride 0) can
/// be walked together.
///
/// Carrying out of a level never walks the cursors back explicitly: the step
/// applied when level `k` increments already includes the rewind of every
/// level below it.
#[derive(Debug, Clone)]
pub struct DimensionLoop {
    // levels as given, before any collapsing
    origin: Vec<LoopLevel>,
    // how many leading origin levels the run covers
    run_levels: usize,
    counts: Vec<usize>,
    strides: Vec<Vec<usize>>,
    // steps[k][c]: wrapping delta for cursor c when level k increments
    steps: Vec<Vec<usize>>,
    tally: Vec<usize>,
    run_len: usize,
    run_strides: Vec<usize>,
    cursors: usize,
    started: bool,
}

impl DimensionLoop {
    /// Loop over a dense array of `dims` with a single cursor. The axes in
    /// `selected_axes` iterate innermost, the first listed fastest; the
    /// remaining axes follow in ascending order.
    pub fn new(dims: &[usize], selected_axes: &[usize], mode: LoopMode) -> CoreResult<Self> {
        if dims.contains(&0) {
            return Err(CoreError::InvalidDims { dims: dims.to_vec() });
        }
        let mut order = VecSet::with_capacity(dims.len());
        for &axis in selected_axes {
            if axis >= dims.len() || !order.push(axis) {
                return Err(CoreError::InvalidAxes { axes: selected_axes.to_vec(), rank: dims.len() });
            }
        }
        for axis in 0..dims.len() {
            order.push(axis);
        }
        let strides = natural_strides(dims);
        let levels = order
            .iter()
            .map(|&axis| LoopLevel { count: dims[axis], strides: vec![strides[axis]] })
            .collect::<Vec<_>>();
        Ok(Self::with_levels(&levels, 1, mode))
    }

    /// Loop over explicit levels for `cursors` cursors. Every level must
    /// carry one stride per cursor and a non-zero count.
    pub fn with_levels(levels: &[LoopLevel], cursors: usize, mode: LoopMode) -> Self {
        debug_assert!(levels.iter().all(|l| l.count > 0 && l.strides.len() == cursors));
        let mut counts = levels.iter().map(|l| l.count).collect::<Vec<_>>();
        let mut strides = levels.iter().map(|l| l.strides.clone()).collect::<Vec<_>>();

        let mut run_len = 1;
        let mut run_strides = vec![0; cursors];
        let mut run_levels = 0;
        if mode == LoopMode::EachContiguousRun && !counts.is_empty() {
            run_levels = 1;
            while counts.len() > 1
                && (0..cursors).all(|c| strides[1][c] == strides[0][c] * counts[0])
            {
                counts[0] *= counts[1];
                counts.remove(1);
                strides.remove(1);
                run_levels += 1;
            }
            run_len = counts.remove(0);
            run_strides = strides.remove(0);
            debug_log!("run of {} with strides {:?}, {} outer levels", run_len, run_strides, counts.len());
        }

        let steps = (0..counts.len())
            .map(|k| {
                (0..cursors)
                    .map(|c| {
                        let consumed = (0..k).fold(0usize, |acc, j| {
                            acc.wrapping_add((counts[j] - 1).wrapping_mul(strides[j][c]))
                        });
                        strides[k][c].wrapping_sub(consumed)
                    })
                    .collect()
            })
            .collect();

        Self {
            origin: levels.to_vec(),
            run_levels,
            tally: vec![0; counts.len()],
            counts,
            strides,
            steps,
            run_len,
            run_strides,
            cursors,
            started: false,
        }
    }

    /// Moves every cursor to the next element (or run). Returns the number of
    /// odometer levels minus the number of levels that wrapped in this step,
    /// so the innermost level ticking returns `levels()`. Returns 0 once the
    /// loop is complete; the cursors are then back at the loop origin and
    /// the loop can be run again.
    pub fn advance(&mut self, cursors: &mut [usize]) -> usize {
        debug_assert_eq!(cursors.len(), self.cursors);
        self.started = true;
        let levels = self.counts.len();
        for k in 0..levels {
            if self.tally[k] + 1 < self.counts[k] {
                self.tally[k] += 1;
                for (cursor, step) in cursors.iter_mut().zip(self.steps[k].iter()) {
                    *cursor = cursor.wrapping_add(*step);
                }
                return levels - k;
            }
            self.tally[k] = 0;
        }
        self.reset_consumed(cursors);
        0
    }

    // Every level sits on its last position: undo all of it.
    fn reset_consumed(&mut self, cursors: &mut [usize]) {
        for (c, cursor) in cursors.iter_mut().enumerate() {
            let consumed = (0..self.counts.len()).fold(0usize, |acc, k| {
                acc.wrapping_add((self.counts[k] - 1).wrapping_mul(self.strides[k][c]))
            });
            *cursor = cursor.wrapping_sub(consumed);
        }
        self.started = false;
    }

    /// True until the first `advance`, and again after the loop completed.
    pub fn at_start(&self) -> bool {
        !self.started
    }

    /// Starts the loop at `offsets` (one entry per level as passed to
    /// `with_levels`, innermost first) instead of at the origin. Collapsing
    /// does not change which offsets are accepted; a start inside a run makes
    /// the loop fall back to single element steps. Only allowed before
    /// iteration begins.
    pub fn subdata(&mut self, cursors: &mut [usize], offsets: &[usize]) -> CoreResult<()> {
        if self.started {
            return Err(CoreError::UnsupportedCombination { reason: "subdata on a running loop" });
        }
        let rank = self.origin.len();
        if offsets.len() != rank {
            return Err(CoreError::WrongSubscriptCount { given: offsets.len(), rank });
        }
        for (axis, (&offset, level)) in offsets.iter().zip(self.origin.iter()).enumerate() {
            if offset >= level.count {
                return Err(CoreError::IndexOutOfRange { axis, index: offset as i64, extent: level.count });
            }
        }

        // back to the origin, then onto the requested position
        let mut current = vec![0; rank];
        current[self.run_levels..].copy_from_slice(&self.tally);
        self.shift(cursors, &current, usize::wrapping_sub);
        if offsets[..self.run_levels].iter().any(|&o| o != 0) {
            debug_log!("start inside a run of {}, stepping per element", self.run_len);
            let (origin, count) = (std::mem::take(&mut self.origin), self.cursors);
            *self = Self::with_levels(&origin, count, LoopMode::EachElement);
        }
        self.shift(cursors, offsets, usize::wrapping_add);
        self.tally.copy_from_slice(&offsets[self.run_levels..]);
        Ok(())
    }

    // Applies `op` to every cursor with its distance to `position`.
    fn shift(&self, cursors: &mut [usize], position: &[usize], op: fn(usize, usize) -> usize) {
        for (c, cursor) in cursors.iter_mut().enumerate() {
            let distance = self.origin.iter().zip(position).fold(0usize, |acc, (level, &p)| {
                acc.wrapping_add(p.wrapping_mul(level.strides[c]))
            });
            *cursor = op(*cursor, distance);
        }
    }

    /// Current odometer position, innermost level first.
    pub fn coords(&self) -> &[usize] {
        &self.tally
    }

    pub fn levels(&self) -> usize {
        self.counts.len()
    }

    /// Elements covered by one step: 1 in `EachElement` mode.
    pub fn run_len(&self) -> usize {
        self.run_len
    }

    /// Element stride of cursor `cursor` inside a run.
    pub fn run_stride(&self, cursor: usize) -> usize {
        self.run_strides[cursor]
    }

    /// Calls `f` with the cursors at every step of one full pass.
    pub fn for_each_step<F: FnMut(&[usize])>(&mut self, cursors: &mut [usize], mut f: F) {
        loop {
            f(cursors);
            if self.advance(cursors) == 0 {
                break;
            }
        }
    }
}
