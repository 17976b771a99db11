//! Batching over a [`Dataset`].

use crate::dataset::{AgeSample, Dataset, FaceSample};
use crate::transform::Item;
use crate::DatasetError;
use ndarray::{Array4, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Samples that can be stacked into a batch.
pub trait Collate: Sized {
    type Batch;

    fn collate(samples: Vec<Self>) -> Result<Self::Batch, DatasetError>;
}

#[derive(Debug, Clone)]
pub struct FaceBatch {
    /// `(N, C, H, W)`
    pub images: Array4<f32>,
    pub filenames: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AgeBatch {
    pub images: Array4<f32>,
    pub ages: Vec<u32>,
    pub filenames: Vec<String>,
}

impl Collate for FaceSample {
    type Batch = FaceBatch;

    fn collate(samples: Vec<Self>) -> Result<FaceBatch, DatasetError> {
        let (items, filenames) = samples.into_iter().map(|s| (s.image, s.filename)).unzip();
        Ok(FaceBatch { images: stack(items)?, filenames })
    }
}

impl Collate for AgeSample {
    type Batch = AgeBatch;

    fn collate(samples: Vec<Self>) -> Result<AgeBatch, DatasetError> {
        let mut items = Vec::with_capacity(samples.len());
        let mut ages = Vec::with_capacity(samples.len());
        let mut filenames = Vec::with_capacity(samples.len());
        for s in samples {
            items.push(s.image);
            ages.push(s.age);
            filenames.push(s.filename);
        }
        Ok(AgeBatch { images: stack(items)?, ages, filenames })
    }
}

/// Stack items into `(N, C, H, W)`; every item must share one shape.
fn stack(items: Vec<Item>) -> Result<Array4<f32>, DatasetError> {
    let Some(first) = items.first() else {
        return Ok(Array4::zeros((0, 0, 0, 0)));
    };
    let expected = first.shape();
    if let Some(found) = items.iter().map(Item::shape).find(|s| *s != expected) {
        return Err(DatasetError::ShapeMismatch { expected, found });
    }

    let [c, h, w] = expected;
    let mut batch = Array4::zeros((items.len(), c, h, w));
    for (mut slot, item) in batch.axis_iter_mut(Axis(0)).zip(items) {
        slot.assign(&item.into_tensor());
    }
    Ok(batch)
}

/// Iterates a dataset in batches of `batch_size`; the last batch may be short.
pub struct DataLoader<'a, D> {
    dataset: &'a D,
    batch_size: usize,
    shuffle: bool,
    seed: Option<u64>,
}

impl<'a, D> DataLoader<'a, D>
where
    D: Dataset,
    D::Sample: Collate,
{
    /// A `batch_size` of zero is treated as one.
    pub fn new(dataset: &'a D, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle: false,
            seed: None,
        }
    }

    /// Visit samples in a random order, redrawn on every [`iter`](Self::iter).
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Fix the shuffle order.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn iter(&self) -> Batches<'a, D> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            order.shuffle(&mut rng);
        }
        tracing::debug!(
            samples = order.len(),
            batch_size = self.batch_size,
            shuffle = self.shuffle,
            "starting epoch"
        );
        Batches {
            dataset: self.dataset,
            order,
            batch_size: self.batch_size,
            pos: 0,
        }
    }
}

impl<'a, 'l, D> IntoIterator for &'l DataLoader<'a, D>
where
    D: Dataset,
    D::Sample: Collate,
{
    type Item = Result<<D::Sample as Collate>::Batch, DatasetError>;
    type IntoIter = Batches<'a, D>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`DataLoader`].
pub struct Batches<'a, D> {
    dataset: &'a D,
    order: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl<D> Iterator for Batches<'_, D>
where
    D: Dataset,
    D::Sample: Collate,
{
    type Item = Result<<D::Sample as Collate>::Batch, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let indices = &self.order[self.pos..end];
        self.pos = end;

        let samples = indices
            .iter()
            .map(|&i| self.dataset.get(i))
            .collect::<Result<Vec<_>, _>>();
        Some(samples.and_then(<D::Sample as Collate>::collate))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.order.len() - self.pos).div_ceil(self.batch_size);
        (n, Some(n))
    }
}
