//! A dense, row-major, single-channel intensity image.

use ndarray::Array2;

use crate::error::Error;
use crate::number::Number;

/// A pixel on the flooding frontier: its coordinates and image value.
///
/// Coordinates are 16-bit, matching the supported image dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Pixel<T> {
    pub x: i16,
    pub y: i16,
    pub value: T,
}

impl<T: Number> Pixel<T> {
    /// The row-major index of this pixel in an image of the given width.
    pub fn index(&self, width: i16) -> i32 {
        i32::from(self.y) * i32::from(width) + i32::from(self.x)
    }
}

/// A dense `height x width` grid of intensities, indexed row-major as
/// `i = y * width + x`. The image is immutable for the lifetime of the tree
/// built over it.
#[derive(Debug, Clone)]
pub struct Image<T: Number> {
    data: Vec<T>,
    height: i16,
    width: i16,
}

impl<T: Number> Image<T> {
    /// Wraps a row-major buffer.
    ///
    /// # Errors
    ///
    /// * `EmptyImage` if either dimension is zero.
    /// * `ImageTooLarge` if a dimension exceeds `i16::MAX` or the pixel
    ///   count exceeds `i32::MAX`.
    /// * `DimensionMismatch` if `data.len() != height * width`.
    pub fn new(data: Vec<T>, height: usize, width: usize) -> Result<Self, Error> {
        if height == 0 || width == 0 {
            return Err(Error::EmptyImage { height, width });
        }
        if height > i16::MAX as usize
            || width > i16::MAX as usize
            || height * width > i32::MAX as usize
        {
            return Err(Error::ImageTooLarge { height, width });
        }
        if data.len() != height * width {
            return Err(Error::DimensionMismatch {
                len: data.len(),
                height,
                width,
            });
        }
        Ok(Image {
            data,
            height: height as i16,
            width: width as i16,
        })
    }

    pub fn height(&self) -> i16 {
        self.height
    }

    pub fn width(&self) -> i16 {
        self.width
    }

    /// The number of pixels.
    pub fn size(&self) -> i32 {
        i32::from(self.height) * i32::from(self.width)
    }

    /// The intensity at a settled row-major index.
    pub fn value(&self, index: i32) -> T {
        self.data[index as usize]
    }

    /// The underlying row-major buffer.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub(crate) fn pixel(&self, x: i16, y: i16) -> Pixel<T> {
        let index = i32::from(y) * i32::from(self.width) + i32::from(x);
        Pixel {
            x,
            y,
            value: self.data[index as usize],
        }
    }

    /// Copies the image into an `ndarray` array.
    pub fn to_array(&self) -> Array2<T> {
        Array2::from_shape_vec(
            (self.height as usize, self.width as usize),
            self.data.clone(),
        )
        .unwrap()
    }
}

impl<T: Number> TryFrom<Array2<T>> for Image<T> {
    type Error = Error;

    fn try_from(array: Array2<T>) -> Result<Self, Error> {
        let (height, width) = array.dim();
        let data = if array.is_standard_layout() {
            array.into_raw_vec()
        } else {
            array.iter().copied().collect()
        };
        Image::new(data, height, width)
    }
}
