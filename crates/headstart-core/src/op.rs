// Op — provenance of a tensor in the computation graph
//
// A tensor computed from trainable variables records the op and the input
// tensors that produced it. headstart never runs a backward pass; the graph
// exists so that "requires grad" and "detached" have precise meanings:
//
//   - a variable (model parameter) requires grad;
//   - a result requires grad iff it recorded an op (some input required grad
//     and grad tracking was enabled when it was computed);
//   - `detach()` and anything computed under `no_grad` have `Op::None`.
//
// Recording the inputs keeps them alive as long as the result. That is the
// memory cost the feature extractor avoids by running the backbone inside
// `no_grad` and detaching its outputs.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{Backend, BinaryOp, ReduceOp, UnaryOp};
use crate::tensor::Tensor;

/// Unique identifier for a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(u64);

impl Default for TensorId {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorId {
    /// Next id from a global counter.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        TensorId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The operation that produced a tensor, holding its inputs.
pub enum Op<B: Backend> {
    /// Leaf: input data, parameters, detached results.
    None,
    Binary {
        lhs: Tensor<B>,
        rhs: Tensor<B>,
        op: BinaryOp,
    },
    Unary {
        input: Tensor<B>,
        op: UnaryOp,
    },
    Reduce {
        input: Tensor<B>,
        op: ReduceOp,
        dim: usize,
    },
    Matmul {
        lhs: Tensor<B>,
        rhs: Tensor<B>,
    },
    Affine {
        input: Tensor<B>,
        mul: f64,
        add: f64,
    },
    WhereCond {
        on_true: Tensor<B>,
        on_false: Tensor<B>,
    },
    Cat {
        inputs: Vec<Tensor<B>>,
        dim: usize,
    },
    /// Any zero-copy view (transpose, narrow, reshape, squeeze, ...).
    View {
        input: Tensor<B>,
    },
    /// Copy to another device.
    ToDevice {
        input: Tensor<B>,
    },
}

impl<B: Backend> Clone for Op<B> {
    fn clone(&self) -> Self {
        match self {
            Op::None => Op::None,
            Op::Binary { lhs, rhs, op } => Op::Binary {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
                op: *op,
            },
            Op::Unary { input, op } => Op::Unary {
                input: input.clone(),
                op: *op,
            },
            Op::Reduce { input, op, dim } => Op::Reduce {
                input: input.clone(),
                op: *op,
                dim: *dim,
            },
            Op::Matmul { lhs, rhs } => Op::Matmul {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
            Op::Affine { input, mul, add } => Op::Affine {
                input: input.clone(),
                mul: *mul,
                add: *add,
            },
            Op::WhereCond { on_true, on_false } => Op::WhereCond {
                on_true: on_true.clone(),
                on_false: on_false.clone(),
            },
            Op::Cat { inputs, dim } => Op::Cat {
                inputs: inputs.clone(),
                dim: *dim,
            },
            Op::View { input } => Op::View {
                input: input.clone(),
            },
            Op::ToDevice { input } => Op::ToDevice {
                input: input.clone(),
            },
        }
    }
}

impl<B: Backend> Op<B> {
    pub fn is_none(&self) -> bool {
        matches!(self, Op::None)
    }

    /// The tensors this op read from.
    pub fn inputs(&self) -> Vec<&Tensor<B>> {
        match self {
            Op::None => vec![],
            Op::Binary { lhs, rhs, .. } | Op::Matmul { lhs, rhs } => vec![lhs, rhs],
            Op::Unary { input, .. }
            | Op::Reduce { input, .. }
            | Op::Affine { input, .. }
            | Op::View { input }
            | Op::ToDevice { input } => vec![input],
            Op::WhereCond { on_true, on_false } => vec![on_true, on_false],
            Op::Cat { inputs, .. } => inputs.iter().collect(),
        }
    }

    /// Short name for debugging output.
    pub fn name(&self) -> &'static str {
        match self {
            Op::None => "none",
            Op::Binary { .. } => "binary",
            Op::Unary { .. } => "unary",
            Op::Reduce { .. } => "reduce",
            Op::Matmul { .. } => "matmul",
            Op::Affine { .. } => "affine",
            Op::WhereCond { .. } => "where_cond",
            Op::Cat { .. } => "cat",
            Op::View { .. } => "view",
            Op::ToDevice { .. } => "to_device",
        }
    }
}

// no_grad — thread-local switch that disables graph recording

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether ops on this thread currently record their inputs.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|g| g.get())
}

/// Restores the previous grad-enabled state when dropped.
struct GradModeGuard {
    prev: bool,
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|g| g.set(self.prev));
    }
}

/// Run `f` with graph recording disabled on this thread.
///
/// Results computed inside carry `Op::None` even when their inputs are
/// variables. Scopes nest, and the previous state is restored on exit,
/// including early returns and panics.
///
/// ```ignore
/// let features = no_grad(|| backbone.forward(&x))?;
/// assert!(!features.requires_grad());
/// ```
pub fn no_grad<F, T>(f: F) -> T
where
    F: FnOnce() -> T,
{
    let _guard = GradModeGuard {
        prev: GRAD_ENABLED.with(|g| g.replace(false)),
    };
    f()
}
