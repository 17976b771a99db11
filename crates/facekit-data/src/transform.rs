//! Per-sample image transforms.

use crate::DatasetError;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array3, Axis};

/// A sample image before or after tensor conversion.
#[derive(Debug, Clone)]
pub enum Item {
    Image(RgbImage),
    /// Channel-first `(C, H, W)` values.
    Tensor(Array3<f32>),
}

impl Item {
    /// `(C, H, W)` of the item; images always report three channels.
    pub fn shape(&self) -> [usize; 3] {
        match self {
            Item::Image(img) => [3, img.height() as usize, img.width() as usize],
            Item::Tensor(t) => {
                let (c, h, w) = t.dim();
                [c, h, w]
            }
        }
    }

    /// Tensor form of the item, converting images as [`ToTensor`] does.
    pub fn into_tensor(self) -> Array3<f32> {
        match self {
            Item::Image(img) => image_to_tensor(&img),
            Item::Tensor(t) => t,
        }
    }
}

pub trait Transform {
    fn apply(&self, item: Item) -> Result<Item, DatasetError>;
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn apply(&self, item: Item) -> Result<Item, DatasetError> {
        (**self).apply(item)
    }
}

/// Bilinear resize to `width` x `height`.
#[derive(Debug, Clone, Copy)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Transform for Resize {
    fn apply(&self, item: Item) -> Result<Item, DatasetError> {
        match item {
            Item::Image(img) => Ok(Item::Image(imageops::resize(
                &img,
                self.width,
                self.height,
                FilterType::Triangle,
            ))),
            Item::Tensor(_) => Err(DatasetError::WrongItem {
                transform: "Resize",
                expected: "an image",
            }),
        }
    }
}

/// RGB image to a `(3, H, W)` tensor scaled to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToTensor;

impl Transform for ToTensor {
    fn apply(&self, item: Item) -> Result<Item, DatasetError> {
        match item {
            Item::Image(img) => Ok(Item::Tensor(image_to_tensor(&img))),
            Item::Tensor(_) => Err(DatasetError::WrongItem {
                transform: "ToTensor",
                expected: "an image",
            }),
        }
    }
}

fn image_to_tensor(img: &RgbImage) -> Array3<f32> {
    let (w, h) = img.dimensions();
    Array3::from_shape_fn((3, h as usize, w as usize), |(c, y, x)| {
        img.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

/// Per-channel `(t - mean) / std` on a three-channel tensor.
#[derive(Debug, Clone, Copy)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalize {
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { mean, std }
    }
}

impl Transform for Normalize {
    fn apply(&self, item: Item) -> Result<Item, DatasetError> {
        let Item::Tensor(mut t) = item else {
            return Err(DatasetError::WrongItem {
                transform: "Normalize",
                expected: "a tensor",
            });
        };
        if t.len_of(Axis(0)) != 3 {
            return Err(DatasetError::InvalidNormalize(format!(
                "expected 3 channels, got {}",
                t.len_of(Axis(0))
            )));
        }
        if self.std.iter().any(|&s| s == 0.0) {
            return Err(DatasetError::InvalidNormalize(format!(
                "std contains zero: {:?}",
                self.std
            )));
        }

        for (c, mut channel) in t.axis_iter_mut(Axis(0)).enumerate() {
            let (mean, std) = (self.mean[c], self.std[c]);
            channel.mapv_inplace(|v| (v - mean) / std);
        }
        Ok(Item::Tensor(t))
    }
}

/// Applies transforms in order.
#[derive(Default)]
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn then(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }
}

impl Transform for Compose {
    fn apply(&self, item: Item) -> Result<Item, DatasetError> {
        self.transforms.iter().try_fold(item, |item, t| t.apply(item))
    }
}
