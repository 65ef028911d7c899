use std::fmt;

// Element types. Backbone inputs and cached features are float; labels
// coming out of a loader are I64 class indices or float regression targets.
// Comparison kernels produce U8 masks. I64 values are copied as integers
// end to end, so ids above 2^53 survive extraction unchanged.

/// Runtime tag carried by every tensor's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    U8,
    U32,
    I64,
}

impl DType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::U8 => 1,
            DType::F32 | DType::U32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    /// True for F32 and F64. Layers with learned weights (`Linear`) insist
    /// on a float dtype; integer dtypes carry labels, indices and masks.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I64 => "i64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native scalars that have a [`DType`].
///
/// `Tensor::from_slice(&[3i64, 1], 2, &dev)` stores the values as given and
/// `labels.to_vec::<i64>()` reads them back exactly. Arithmetic kernels work
/// in f64 through [`WithDType::into_f64`] / [`WithDType::from_f64`]; copies
/// between storages of the same dtype never do.
pub trait WithDType: Copy + Send + Sync + 'static + num_traits::NumCast + fmt::Debug {
    const DTYPE: DType;

    /// Lossy widening used by the arithmetic kernels.
    fn into_f64(self) -> f64 {
        num_traits::cast(self).unwrap_or(f64::NAN)
    }

    /// Narrowing from f64; integer targets saturate and map NaN to zero.
    fn from_f64(v: f64) -> Self;

    /// Convert from another native scalar without passing through f64 when
    /// the value fits, e.g. `i64 -> i64` or `u32 -> i64`. Values that do not
    /// fit fall back to the saturating f64 path.
    fn from_native<V: WithDType>(v: V) -> Self {
        <Self as num_traits::NumCast>::from(v).unwrap_or_else(|| Self::from_f64(v.into_f64()))
    }
}

macro_rules! with_dtype {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl WithDType for $ty {
                const DTYPE: DType = DType::$dtype;
                fn from_f64(v: f64) -> Self {
                    v as $ty
                }
            }
        )*
    };
}

with_dtype!(f32 => F32, f64 => F64, u8 => U8, u32 => U32, i64 => I64);
