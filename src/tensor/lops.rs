use crate::{
  internal::*,
  shape::Shape,
  tensor::Tensor,
  scalar::{ Inner, Numeric, Real },
  ops::{ BaseOps, NumericOps, Hops },
};


impl<T: Real> Hops<T> for Tensor<T> {}

impl<T: Inner> BaseOps<T> for Tensor<T> {
  fn shape(&self) -> &Shape {
    &self.shape
  }

  fn reshape(&self, dims: &[usize]) -> Self {
    let this = self.contiguous();
    Self { shape: this.shape.view(dims), data: this.data }
  }

  fn narrow(&self, dim: isize, start: usize, len: usize) -> Self {
    let dim = negative_index(dim, self.rank(), false);
    Self { shape: self.shape.narrow(dim, start, len), data: self.data.clone() }
  }

  fn flip(&self, dim: isize) -> Self {
    let dim = negative_index(dim, self.rank(), false);
    Self { shape: self.shape.flip(dim), data: self.data.clone() }
  }

  fn concat(&self, rhs: &Self, dim: isize) -> Self {
    let dim = negative_index(dim, self.rank(), false);
    let mut dims = self.shape.dims.clone();
    let mut rhs_dims = rhs.shape.dims.clone();
    dims[dim] = 0;
    rhs_dims[dim] = 0;
    assert_eq!(dims, rhs_dims,
      "Cannot concat {} & {} tensors. Shapes may only differ in dim {}",
      self.shape, rhs.shape, dim);
    // Interleave the blocks below the concatenated dimension
    let outer: usize = self.shape.dims[..dim].iter().product();
    let block_l: usize = self.shape.dims[dim..].iter().product();
    let block_r: usize = rhs.shape.dims[dim..].iter().product();
    let data_l = self.to_vec();
    let data_r = rhs.to_vec();
    let mut data = Vec::with_capacity(data_l.len() + data_r.len());
    for o in 0..outer {
      data.extend_from_slice(&data_l[o * block_l .. (o + 1) * block_l]);
      data.extend_from_slice(&data_r[o * block_r .. (o + 1) * block_r]);
    }
    dims[dim] = self.shape.dims[dim] + rhs.shape.dims[dim];
    Self::new(&dims, data)
  }
}

impl<T: Numeric> NumericOps<T> for Tensor<T> {
  fn sum(&self) -> Self {
    Self::scalar(self.sum_all())
  }

  fn scale(&self, factor: T) -> Self {
    self.vectorize(|a| a * factor )
  }
}

impl<T: Real> std::ops::Neg for &Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    self.vectorize(|a| -a )
  }
}

impl<T: Real> std::ops::Neg for Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    -&self
  }
}

macro_rules! add_operator {
  ($trait:ident, $meth:ident, $symbol:tt) => {
    impl<T: Numeric> std::ops::$trait for &Tensor<T> { // &tensor * &other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Self) -> Tensor<T> {
        self.zip(rhs, |a, b| a $symbol b )
      }
    }

    impl<T: Numeric> std::ops::$trait for Tensor<T> { // tensor * other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Self) -> Tensor<T> {
        &self $symbol &rhs
      }
    }

    impl<T: Numeric> std::ops::$trait<Tensor<T>> for &Tensor<T> { // &tensor * other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Tensor<T>) -> Tensor<T> {
        self $symbol &rhs
      }
    }

    impl<T: Numeric> std::ops::$trait<&Tensor<T>> for Tensor<T> { // tensor * &other
      type Output = Tensor<T>;

      fn $meth(self, rhs: &Tensor<T>) -> Tensor<T> {
        &self $symbol rhs
      }
    }

    impl<T: Numeric> std::ops::$trait<T> for &Tensor<T> { // &tensor * T
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        self.vectorize(|a| a $symbol rhs )
      }
    }

    impl<T: Numeric> std::ops::$trait<T> for Tensor<T> { // tensor * T
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        &self $symbol rhs
      }
    }
  };
}

add_operator!(Add, add, +);
add_operator!(Sub, sub, -);
add_operator!(Mul, mul, *);
