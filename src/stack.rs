//! The LIFO of pixels on the active ascent path during flooding.

use crate::image::Pixel;
use crate::number::Number;

const INITIAL_CAPACITY: usize = 1024;

#[derive(Debug)]
pub(crate) struct PixelStack<T: Number> {
    entries: Vec<Pixel<T>>,
}

impl<T: Number> PixelStack<T> {
    pub fn new() -> Self {
        PixelStack {
            entries: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn push(&mut self, pixel: Pixel<T>) {
        self.entries.push(pixel);
    }

    /// Pops the top entry. Panics on an empty stack; the flooding keeps at
    /// least the root on the stack until the final drain.
    pub fn pop(&mut self) -> Pixel<T> {
        self.entries.pop().unwrap()
    }

    pub fn top(&self) -> &Pixel<T> {
        self.entries.last().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_order() {
        let mut stack = PixelStack::new();
        for (i, v) in [1.0_f32, 2.0, 3.0].into_iter().enumerate() {
            stack.push(Pixel {
                x: i as i16,
                y: 0,
                value: v,
            });
        }

        assert_eq!(stack.len(), 3);
        assert_eq!(stack.top().value, 3.0);
        assert_eq!(stack.pop().value, 3.0);
        assert_eq!(stack.pop().value, 2.0);
        assert_eq!(stack.top().value, 1.0);
        assert_eq!(stack.len(), 1);
    }
}
