use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Tensor dimensions in (batch, channels, height, width) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl Shape {
    pub const fn new(n: usize, c: usize, h: usize, w: usize) -> Shape {
        Shape { n, c, h, w }
    }

    /// Total number of elements, N·C·H·W.
    pub const fn count(&self) -> usize {
        self.n * self.c * self.h * self.w
    }

    /// Elements per batch sample, C·H·W.
    pub const fn per_sample(&self) -> usize {
        self.c * self.h * self.w
    }

    /// Same sample geometry with a different batch dimension.
    pub const fn with_batch(&self, n: usize) -> Shape {
        Shape { n, ..*self }
    }

    /// True if both shapes describe the same per-sample geometry.
    pub fn same_sample(&self, other: &Shape) -> bool {
        self.c == other.c && self.h == other.h && self.w == other.w
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.n, self.c, self.h, self.w)
    }
}

/// Dense, contiguous NCHW buffer of `f32`.
///
/// The buffer length always equals `shape.count()`. The shape never changes
/// after construction; a batch of a different size is a new tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: Shape) -> Tensor {
        Tensor {
            shape,
            data: vec![0.0; shape.count()],
        }
    }

    /// Wraps an existing buffer.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.count()`.
    pub fn from_vec(shape: Shape, data: Vec<f32>) -> Tensor {
        assert_eq!(
            data.len(),
            shape.count(),
            "buffer of {} elements cannot back a tensor of shape {}",
            data.len(),
            shape
        );
        Tensor { shape, data }
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    pub fn he<R: Rng + ?Sized>(shape: Shape, fan_in: usize, rng: &mut R) -> Tensor {
        let std_dev = (2.0 / fan_in.max(1) as f32).sqrt();
        let data = (0..shape.count())
            .map(|_| sample_standard_normal(rng) * std_dev)
            .collect();
        Tensor { shape, data }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// N·C·H·W.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// C·H·W.
    pub fn per_sample_len(&self) -> usize {
        self.shape.per_sample()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// The contiguous slice holding batch sample `n`.
    pub fn sample(&self, n: usize) -> &[f32] {
        let len = self.shape.per_sample();
        &self.data[n * len..(n + 1) * len]
    }

    pub fn sample_mut(&mut self, n: usize) -> &mut [f32] {
        let len = self.shape.per_sample();
        &mut self.data[n * len..(n + 1) * len]
    }

    /// Linear offset of element (n, c, h, w).
    pub fn offset(&self, n: usize, c: usize, h: usize, w: usize) -> usize {
        debug_assert!(n < self.shape.n && c < self.shape.c && h < self.shape.h && w < self.shape.w);
        ((n * self.shape.c + c) * self.shape.h + h) * self.shape.w + w
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }
}

impl Index<usize> for Tensor {
    type Output = f32;

    fn index(&self, offset: usize) -> &f32 {
        &self.data[offset]
    }
}

impl IndexMut<usize> for Tensor {
    fn index_mut(&mut self, offset: usize) -> &mut f32 {
        &mut self.data[offset]
    }
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    // Uniform samples on (0, 1] keep ln() finite.
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = 1.0 - rng.gen::<f32>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn zeros_is_zero_filled_and_sized() {
        let t = Tensor::zeros(Shape::new(2, 3, 4, 5));
        assert_eq!(t.len(), 120);
        assert_eq!(t.per_sample_len(), 60);
        assert!(t.data().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn offset_is_row_major_nchw() {
        let t = Tensor::zeros(Shape::new(2, 3, 4, 5));
        assert_eq!(t.offset(0, 0, 0, 1), 1);
        assert_eq!(t.offset(0, 0, 1, 0), 5);
        assert_eq!(t.offset(0, 1, 0, 0), 20);
        assert_eq!(t.offset(1, 0, 0, 0), 60);
    }

    #[test]
    #[should_panic]
    fn from_vec_rejects_wrong_length() {
        Tensor::from_vec(Shape::new(1, 1, 2, 2), vec![0.0; 3]);
    }

    #[test]
    fn he_init_is_reproducible_for_a_seed() {
        let shape = Shape::new(4, 3, 2, 2);
        let a = Tensor::he(shape, 12, &mut StdRng::seed_from_u64(7));
        let b = Tensor::he(shape, 12, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(a.data().iter().all(|x| x.is_finite()));
    }
}
