use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

mod mops;

use crate::{
  internal::*,
  tensor::Tensor,
  scalar::Real,
  ops::{ NumericOps, Hops },
  error::{ Result, SigError },
};


/// Unary computational operation that can also compute its derivative.

pub trait UnaryOp<T: Real>: Debug + Send + Sync {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T>;
  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T>;
}


/// Binary computational operation that can also compute its derivative.

pub trait BinaryOp<T: Real>: Debug + Send + Sync {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T>;
  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>);
}


/// Computational operation over any number of inputs.
///
/// Multi ops may hold on to state produced by [run](MultiOp::run) and
/// consume it in [derive](MultiOp::derive). Both steps may fail.

pub trait MultiOp<T: Real>: Debug + Send + Sync {
  fn run(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>>;
  fn derive(&self, inputs: &[&Tensor<T>], grad: &Tensor<T>) -> Result<Vec<Tensor<T>>>;
}


#[derive(Debug)]
enum Op<T: Real> {
  Unary(Box<dyn UnaryOp<T>>),
  Binary(Box<dyn BinaryOp<T>>),
  Multi(Box<dyn MultiOp<T>>),
}


/// Node in a computation graph, containing a [Variable]'s data and gradient,
/// as well as the operation used to create it.

#[derive(Debug)]
struct Node<T: Real> {
  id: usize,
  data: Tensor<T>,
  grad: Option<Tensor<T>>,
  op: Option<Op<T>>,
  previous: Vec<Arc<Node<T>>>,
  trainable: bool,
}

impl<T: Real> Node<T> {
  fn reset_gradient(&self, filler: T) {
    if let Some(grad) = &self.grad {
      grad.refill(filler);
    }
  }

  fn backward(&self) -> Result<()> {
    if let (Some(op), Some(grad)) = (&self.op, &self.grad) {
      let inputs: Vec<&Tensor<T>> = self.previous.iter().map(|prev| &prev.data ).collect();
      let changes = match op {
        Op::Unary(op) => vec![op.derive(inputs[0], grad)],
        Op::Binary(op) => {
          let (lhs, rhs) = op.derive(inputs[0], inputs[1], grad);
          vec![lhs, rhs]
        },
        Op::Multi(op) => op.derive(&inputs, grad)?,
      };
      for (change, prev) in changes.iter().zip(self.previous.iter()) {
        if let Some(grad) = &prev.grad {
          grad.op_assign(change, |a, b| *a += b );
        }
      }
    }
    Ok(())
  }
}


/// Variables track the computational operations used to create them and allow
/// for computing their gradient with respect to all input variables involved.
///
/// They get created by calling [tracked](Tensor::tracked) or
/// [trained](Tensor::trained) on any differentiable [Tensor] type.
/// Only trained variables, and everything computed from them, carry gradients.
///
/// Variables dereference to their underlying [Tensor] automatically for
/// non-differentiable operations. Differentiable operations, on the other hand,
/// will always return another Variable.

#[derive(Debug, Clone)]
pub struct Variable<T: Real> {
  node: Arc<Node<T>>,
}

impl<T: Real> Hops<T> for Variable<T> {}

impl<T: Real> std::ops::Deref for Variable<T> {
  type Target = Tensor<T>;

  fn deref(&self) -> &Self::Target {
    &self.node.data
  }
}

impl<T: Real> PartialEq for Variable<T> {
  fn eq(&self, rhs: &Self) -> bool {
    self.node.data == rhs.node.data
  }
}

impl<T: Real> Variable<T> {
  pub(crate) fn from_tensor(tensor: Tensor<T>, trainable: bool) -> Self {
    Self {
      node: Arc::new(Node {
        id: make_id(),
        grad: trainable.then(|| Tensor::zeros(tensor.dims()) ),
        data: tensor,
        op: None,
        previous: vec![],
        trainable,
      }),
    }
  }

  fn operation(op: Op<T>, data: Tensor<T>, grad: bool, previous: Vec<Arc<Node<T>>>) -> Self {
    Self {
      node: Arc::new(Node {
        id: make_id(),
        grad: grad.then(|| Tensor::zeros(data.dims()) ),
        data,
        op: Some(op),
        previous,
        trainable: false,
      }),
    }
  }

  pub fn id(&self) -> usize {
    self.node.id
  }

  pub fn tensor(&self) -> &Tensor<T> {
    &self.node.data
  }

  pub fn grad(&self) -> Option<&Tensor<T>> {
    self.node.grad.as_ref()
  }

  pub fn requires_grad(&self) -> bool {
    self.node.grad.is_some()
  }

  pub fn unary_op(&self, op: impl UnaryOp<T> + 'static) -> Self {
    let data = op.run(&self.node.data);
    Self::operation(
      Op::Unary(Box::new(op)),
      data,
      self.requires_grad(),
      vec![self.node.clone()],
    )
  }

  pub fn binary_op(&self, op: impl BinaryOp<T> + 'static, rhs: &Self) -> Self {
    let data = op.run(&self.node.data, &rhs.node.data);
    Self::operation(
      Op::Binary(Box::new(op)),
      data,
      self.requires_grad() || rhs.requires_grad(),
      vec![self.node.clone(), rhs.node.clone()],
    )
  }

  pub fn multi_op(op: impl MultiOp<T> + 'static, inputs: &[&Self]) -> Result<Self> {
    let tensors: Vec<&Tensor<T>> = inputs.iter().map(|input| &input.node.data ).collect();
    let data = op.run(&tensors)?;
    Ok(Self::operation(
      Op::Multi(Box::new(op)),
      data,
      inputs.iter().any(|input| input.requires_grad() ),
      inputs.iter().map(|input| input.node.clone() ).collect(),
    ))
  }

  /// Compute gradients across this Variable's entire graph,
  /// seeding this Variable's own gradient with ones.

  pub fn backward(&self) -> Result<()> {
    self.backward_with(&Tensor::ones(self.dims()))
  }

  /// Compute gradients across this Variable's entire graph, starting
  /// from the given gradient of some downstream quantity with respect
  /// to this Variable.
  ///
  /// Gradients of trained inputs accumulate across calls until [reset](Variable::reset).

  pub fn backward_with(&self, grad: &Tensor<T>) -> Result<()> {
    let own = self.grad().ok_or(SigError::NotDifferentiable)?;
    if grad.dims() != self.dims() {
      return Err(SigError::GradientShape { expected: self.dims().to_vec(), found: grad.dims().to_vec() })
    }
    let history = self.history();
    for node in history.iter().filter(|node| node.op.is_some() ) {
      node.reset_gradient(T::zero());
    }
    own.assign(grad);
    for node in history.iter().rev() {
      node.backward()?;
    }
    Ok(())
  }

  /// Set gradients to zero for this Variable's entire graph.

  pub fn reset(&self) {
    for node in self.history() {
      node.reset_gradient(T::zero());
    }
  }

  fn history(&self) -> Vec<Arc<Node<T>>> {
    let mut history = vec![];
    Self::history_recurse(&self.node, &mut history, &mut HashSet::new());
    history
  }

  fn history_recurse(node: &Arc<Node<T>>, history: &mut Vec<Arc<Node<T>>>, visited: &mut HashSet<usize>) {
    if !visited.insert(node.id) { return }
    for prev in &node.previous {
      Self::history_recurse(prev, history, visited);
    }
    history.push(node.clone());
  }

  /// Compute a function's gradient with respect to a generated
  /// input numerically and compare it to the automatically derived
  /// solution.
  ///
  /// Returns the mean absolute difference between both gradients.
  /// Central differences use a step of `1e-3`, so this is meant
  /// for double precision.

  pub fn check_gradients<F>(input: &Tensor<T>, generator: F) -> Result<T>
  where
    F: Fn(&Self) -> Result<Self>
  {
    let eps = T::from(1e-3).unwrap();
    let two = T::one() + T::one();
    let input = input.detach();
    // Gradient using auto diff
    let var = input.trained();
    let output = generator(&var)?.sum();
    output.backward()?;
    let grad = var.grad().ok_or(SigError::NotDifferentiable)?.detach();
    // Gradient computed numerically for every element of the input
    let len = input.size();
    let mut num_grad = Vec::with_capacity(len);
    for i in 0..len {
      let mut shifted = input.to_vec();
      shifted[i] = shifted[i] + eps;
      let next = generator(&Tensor::new(input.dims(), shifted.clone()).tracked())?.sum().item();
      shifted[i] = shifted[i] - eps - eps;
      let prev = generator(&Tensor::new(input.dims(), shifted).tracked())?.sum().item();
      num_grad.push((next - prev) / (two * eps));
    }
    let num_grad = Tensor::new(input.dims(), num_grad);
    let diff: T = grad.zip(&num_grad, |a, b| (a - b).abs() ).sum_all();
    Ok(diff / real(len.max(1)))
  }
}

impl<T: Real> std::fmt::Display for Variable<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    let title = if self.node.trainable { "Trainable" } else if self.requires_grad() {
      "Computed"
    } else {
      "Tracked"
    };
    write!(f, "{title} {}", self.tensor())
  }
}
