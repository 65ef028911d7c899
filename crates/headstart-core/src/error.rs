use crate::shape::Shape;

/// All errors that can occur within headstart.
///
/// One enum is shared by every crate in the workspace: the tensor core, the
/// backends, the modules, the loaders and the feature extractor all surface
/// their failures through it, so callers propagate a single type with `?`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between two tensors.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// DType mismatch between tensors in a binary operation.
    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// Dimension index out of range for the tensor's rank.
    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Narrow/slice operation out of bounds.
    #[error("narrow out of bounds: dim {dim}, start {start}, len {len}, dim_size {dim_size}")]
    NarrowOutOfBounds {
        dim: usize,
        start: usize,
        len: usize,
        dim_size: usize,
    },

    /// Row index past the end of a dataset or batch.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Tried to access a scalar from a non-scalar tensor.
    #[error("not a scalar: tensor has shape {shape}")]
    NotAScalar { shape: Shape },

    /// Element count mismatch when creating from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Matrix multiplication dimension mismatch.
    #[error("matmul shape mismatch: [{m}x{k1}] @ [{k2}x{n}], inner dims must match")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error(
        "cannot reshape: source has {src} elements, target shape {dst_shape} has {dst} elements"
    )]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// Concatenation of an empty list of tensors.
    #[error("{op}: empty tensor list")]
    EmptyTensorList { op: &'static str },

    /// Two tensors cannot be concatenated because a non-concat dim differs.
    #[error("cat: tensor {index} has shape {got} but expected {expected} outside dim {dim}")]
    CatShapeMismatch {
        index: usize,
        dim: usize,
        expected: Shape,
        got: Shape,
    },

    /// A device refused an allocation (placement failure).
    #[error("allocation of {requested} bytes on {device} exceeds its limit of {limit} bytes")]
    AllocationFailed {
        device: String,
        requested: usize,
        limit: usize,
    },

    /// A module has no parameters to infer its device from.
    #[error("cannot infer device: module has no parameters")]
    NoParameters,

    /// The loader produced no batches, so there is nothing to concatenate.
    #[error("loader produced no batches")]
    EmptyLoader,

    /// Features and labels disagree on the number of samples.
    #[error("length mismatch: {features} feature rows but {labels} label rows")]
    LengthMismatch { features: usize, labels: usize },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout headstart.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted error message.
/// Usage: `bail!("unsupported rank {}", rank)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
