use crate::{
  shape::Shape,
  tensor::Tensor,
  variable::{ Variable, BinaryOp, UnaryOp },
  scalar::Real,
  ops::{ BaseOps, NumericOps },
};


impl<T: Real> BaseOps<T> for Variable<T> {
  fn shape(&self) -> &Shape {
    self.node.data.shape()
  }

  fn reshape(&self, dims: &[usize]) -> Self {
    if dims == self.dims() { return self.clone() }
    self.unary_op(Reshape { dims: dims.to_vec() })
  }

  fn narrow(&self, dim: isize, start: usize, len: usize) -> Self {
    self.unary_op(Narrow { dim, start, len })
  }

  fn flip(&self, dim: isize) -> Self {
    self.unary_op(Flip { dim })
  }

  fn concat(&self, rhs: &Self, dim: isize) -> Self {
    self.binary_op(Concat { dim }, rhs)
  }
}

impl<T: Real> NumericOps<T> for Variable<T> {
  fn sum(&self) -> Self {
    self.unary_op(Sum)
  }

  fn scale(&self, factor: T) -> Self {
    self.unary_op(Scale { factor })
  }
}

impl<T: Real> std::ops::Neg for &Variable<T> {
  type Output = Variable<T>;

  fn neg(self) -> Self::Output {
    self.scale(-T::one())
  }
}

impl<T: Real> std::ops::Neg for Variable<T> {
  type Output = Variable<T>;

  fn neg(self) -> Self::Output {
    -&self
  }
}

macro_rules! add_operator {
  ($op:ident, $meth:ident, $symbol:tt) => {
    impl<T: Real> std::ops::$op for &Variable<T> { // &tensor * &other
      type Output = Variable<T>;

      fn $meth(self, rhs: Self) -> Variable<T> {
        self.binary_op($op, rhs)
      }
    }

    impl<T: Real> std::ops::$op for Variable<T> { // tensor * other
      type Output = Variable<T>;

      fn $meth(self, rhs: Self) -> Variable<T> {
        &self $symbol &rhs
      }
    }

    impl<T: Real> std::ops::$op<Variable<T>> for &Variable<T> { // &tensor * other
      type Output = Variable<T>;

      fn $meth(self, rhs: Variable<T>) -> Variable<T> {
        self $symbol &rhs
      }
    }

    impl<T: Real> std::ops::$op<&Variable<T>> for Variable<T> { // tensor * &other
      type Output = Variable<T>;

      fn $meth(self, rhs: &Variable<T>) -> Variable<T> {
        &self $symbol rhs
      }
    }
  };
}

add_operator!(Add, add, +);
add_operator!(Sub, sub, -);
add_operator!(Mul, mul, *);

impl<T: Real> std::ops::Add<T> for &Variable<T> { // &tensor + T
  type Output = Variable<T>;

  fn add(self, rhs: T) -> Variable<T> {
    self.unary_op(Shift { offset: rhs })
  }
}

impl<T: Real> std::ops::Mul<T> for &Variable<T> { // &tensor * T
  type Output = Variable<T>;

  fn mul(self, rhs: T) -> Variable<T> {
    self.scale(rhs)
  }
}


#[derive(Debug, Clone)]
pub struct Add;

impl<T: Real> BinaryOp<T> for Add {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs + rhs
  }

  fn derive(&self, _lhs: &Tensor<T>, _rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>) {
    (grad.clone(), grad.clone())
  }
}


#[derive(Debug, Clone)]
pub struct Sub;

impl<T: Real> BinaryOp<T> for Sub {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs - rhs
  }

  fn derive(&self, _lhs: &Tensor<T>, _rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>) {
    (grad.clone(), -grad)
  }
}


#[derive(Debug, Clone)]
pub struct Mul;

impl<T: Real> BinaryOp<T> for Mul {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs * rhs
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>) {
    (grad * rhs, grad * lhs)
  }
}


#[derive(Debug, Clone)]
pub struct Scale<T> {
  factor: T,
}

impl<T: Real> UnaryOp<T> for Scale<T> {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs * self.factor
  }

  fn derive(&self, _lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad * self.factor
  }
}


#[derive(Debug, Clone)]
pub struct Shift<T> {
  offset: T,
}

impl<T: Real> UnaryOp<T> for Shift<T> {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs + self.offset
  }

  fn derive(&self, _lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad.clone()
  }
}


#[derive(Debug, Clone)]
pub struct Sum;

impl<T: Real> UnaryOp<T> for Sum {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.sum()
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    Tensor::fill(lhs.dims(), grad.item())
  }
}


#[derive(Debug, Clone)]
pub struct Reshape {
  dims: Vec<usize>,
}

impl<T: Real> UnaryOp<T> for Reshape {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.reshape(&self.dims)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad.reshape(lhs.dims())
  }
}


#[derive(Debug, Clone)]
pub struct Narrow {
  dim: isize,
  start: usize,
  len: usize,
}

impl<T: Real> UnaryOp<T> for Narrow {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.narrow(self.dim, self.start, self.len)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    let out = Tensor::zeros(lhs.dims());
    out.narrow(self.dim, self.start, self.len).assign(grad);
    out
  }
}


#[derive(Debug, Clone)]
pub struct Flip {
  dim: isize,
}

impl<T: Real> UnaryOp<T> for Flip {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.flip(self.dim)
  }

  fn derive(&self, _lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad.flip(self.dim)
  }
}


#[derive(Debug, Clone)]
pub struct Concat {
  dim: isize,
}

impl<T: Real> BinaryOp<T> for Concat {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs.concat(rhs, self.dim)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>) {
    let n = lhs.dim(self.dim);
    (
      grad.narrow(self.dim, 0, n),
      grad.narrow(self.dim, n, rhs.dim(self.dim)),
    )
  }
}
