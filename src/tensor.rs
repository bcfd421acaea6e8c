//! Shaped tensor type with gradient storage
//!
//! Image batches are laid out `[channels, height, width]` in a flat buffer;
//! the shape vector records the logical dimensions. The gradient cell is
//! shared, so clones of a parameter tensor accumulate into the same gradient.

use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Tensor with a flat `f32` buffer, logical shape, and gradient storage
#[derive(Clone)]
pub struct Tensor {
    data: Array1<f32>,
    shape: Vec<usize>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a tensor from a flat buffer and logical shape
    ///
    /// # Panics
    ///
    /// Panics if the buffer length does not match the shape product.
    pub fn new(data: Array1<f32>, shape: Vec<usize>, requires_grad: bool) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "Buffer length must match shape product"
        );
        Self {
            data,
            shape,
            grad: Rc::new(RefCell::new(None)),
            requires_grad,
        }
    }

    /// Create a 1-D tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        let len = data.len();
        Self::new(Array1::from(data), vec![len], requires_grad)
    }

    /// Create a shaped tensor from a vector
    pub fn from_shape_vec(shape: Vec<usize>, data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), shape, requires_grad)
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>, requires_grad: bool) -> Self {
        let len: usize = shape.iter().product();
        Self::new(Array1::zeros(len), shape, requires_grad)
    }

    /// Create a tensor filled with ones
    pub fn ones(shape: Vec<usize>, requires_grad: bool) -> Self {
        let len: usize = shape.iter().product();
        Self::new(Array1::ones(len), shape, requires_grad)
    }

    /// Get reference to the flat data buffer
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Get mutable reference to the flat data buffer
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Logical shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Set gradient, replacing any existing value
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Accumulate gradient (for parameters used multiple times)
    pub fn accumulate_grad(&self, grad: &Array1<f32>) {
        let mut cell = self.grad.borrow_mut();
        if let Some(existing) = cell.as_mut() {
            *existing = &*existing + grad;
        } else {
            *cell = Some(grad.clone());
        }
    }

    /// Zero out gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Check if this tensor requires gradients
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Contiguous slice view of the data
    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice().expect("tensor buffer is contiguous")
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .field("grad", &self.grad.borrow())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}
