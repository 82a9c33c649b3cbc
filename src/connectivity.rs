//! Neighbourhood kernels for the flooding.

use bitvec::prelude::*;

use crate::error::Error;

/// An odd-sided 0/1 grid naming which offsets around a pixel count as
/// neighbours. The centre cell is cleared on construction; a pixel is never
/// its own neighbour.
#[derive(Debug, Clone)]
pub struct Connectivity {
    mask: BitVec,
    height: usize,
    width: usize,
}

impl Connectivity {
    /// Builds a kernel from a row-major grid of cells, treating non-zero as
    /// a neighbour.
    ///
    /// # Errors
    ///
    /// * `EvenKernel` if either dimension is zero or even.
    /// * `EmptyKernel` if no cell outside the centre is set.
    pub fn new(height: usize, width: usize, cells: &[u8]) -> Result<Self, Error> {
        if height == 0 || width == 0 || height % 2 == 0 || width % 2 == 0 {
            return Err(Error::EvenKernel { height, width });
        }
        if cells.len() != height * width {
            return Err(Error::DimensionMismatch {
                len: cells.len(),
                height,
                width,
            });
        }

        let mut mask: BitVec = cells.iter().map(|&c| c != 0).collect();
        mask.set(height / 2 * width + width / 2, false);

        if mask.not_any() {
            return Err(Error::EmptyKernel);
        }

        Ok(Connectivity {
            mask,
            height,
            width,
        })
    }

    /// 4-connectivity: the 3x3 cross.
    pub fn four() -> Self {
        Connectivity::new(
            3,
            3,
            &[
                0, 1, 0, //
                1, 0, 1, //
                0, 1, 0,
            ],
        )
        .unwrap()
    }

    /// 8-connectivity: the full 3x3 Moore neighbourhood.
    pub fn eight() -> Self {
        Connectivity::new(
            3,
            3,
            &[
                1, 1, 1, //
                1, 0, 1, //
                1, 1, 1,
            ],
        )
        .unwrap()
    }

    /// 12-connectivity: a 5x5 disc with the corners and edge midpoints
    /// zeroed.
    pub fn twelve() -> Self {
        Connectivity::new(
            5,
            5,
            &[
                0, 0, 1, 0, 0, //
                0, 1, 1, 1, 0, //
                1, 1, 0, 1, 1, //
                0, 1, 1, 1, 0, //
                0, 0, 1, 0, 0,
            ],
        )
        .unwrap()
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether the kernel cell at `(row, col)` selects a neighbour.
    pub fn is_neighbour(&self, row: usize, col: usize) -> bool {
        self.mask[row * self.width + col]
    }

    /// The number of neighbours the kernel selects.
    pub fn num_neighbours(&self) -> usize {
        self.mask.count_ones()
    }
}
