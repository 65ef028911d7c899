// BatchSource — anything that yields (input, label) batches
//
// The feature extractor does not care where batches come from: a DataLoader
// over a Dataset, or a list of pre-built batch tensors. Both are sources.
// Sources are restartable; each `batches()` call starts from the beginning.

use headstart_core::backend::Backend;
use headstart_core::error::Result;
use headstart_core::tensor::Tensor;

use crate::loader::DataLoader;

/// Iterator over `(input_batch, label_batch)` pairs borrowed from a source.
pub type Batches<'s, B> = Box<dyn Iterator<Item = Result<(Tensor<B>, Tensor<B>)>> + 's>;

/// A finite, restartable producer of `(input_batch, label_batch)` pairs.
pub trait BatchSource<B: Backend> {
    /// Start a new pass from the first batch.
    fn batches(&self) -> Batches<'_, B>;

    /// Number of batches a pass will yield, when known up front.
    fn num_batches_hint(&self) -> Option<usize> {
        None
    }
}

impl<'a, B: Backend> BatchSource<B> for DataLoader<'a, B> {
    fn batches(&self) -> Batches<'_, B> {
        Box::new(self.iter_batches())
    }

    fn num_batches_hint(&self) -> Option<usize> {
        Some(self.num_batches())
    }
}

impl<B: Backend> BatchSource<B> for [(Tensor<B>, Tensor<B>)] {
    fn batches(&self) -> Batches<'_, B> {
        Box::new(self.iter().map(|(x, y)| Ok((x.clone(), y.clone()))))
    }

    fn num_batches_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<B: Backend> BatchSource<B> for Vec<(Tensor<B>, Tensor<B>)> {
    fn batches(&self) -> Batches<'_, B> {
        self.as_slice().batches()
    }

    fn num_batches_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}
