use proptest::prelude::*;

use microsig::{
  ops::*,
  signature_combine,
  Basepoint, SigError, SigOptions, Tensor, Variable,
};


fn path(batch: usize, length: usize, channels: usize) -> Tensor<f64> {
  let size = batch * length * channels;
  Tensor::new(&[batch, length, channels], (0..size).map(|i| ((i * 13 % 17) as f64 - 8.0) * 0.1 ).collect())
}

fn sig(path: &Tensor<f64>, depth: usize, options: &SigOptions<f64>) -> Variable<f64> {
  microsig::signature(&path.tracked(), depth, options).unwrap()
}

// Last point of every batch element, as a basepoint
fn last_point(path: &Tensor<f64>) -> Tensor<f64> {
  let (batch, length, channels) = (path.dims()[0], path.dims()[1], path.dims()[2]);
  path.narrow(1, length - 1, 1).reshape(&[batch, channels])
}


proptest! {
  #[test]
  fn chen_identity(
    values in proptest::collection::vec(-1.0f64..1.0, 18),
    split in 1usize..5,
    depth in 1usize..4,
  ) {
    let path = Tensor::new(&[1,6,3], values);
    let b = Tensor::new(&[1,3], vec![0.1, -0.2, 0.3]).tracked();
    let first = sig(&path.narrow(1, 0, split + 1), depth, &SigOptions::new().basepoint(&b));
    let joint = path.at(&[0, split]).reshape(&[1,3]).tracked();
    let second = sig(&path.narrow(1, split, 6 - split), depth, &SigOptions::new().basepoint(&joint));
    let combined = signature_combine(&first, &second, 3, depth, false).unwrap();
    let whole = sig(&path, depth, &SigOptions::new().basepoint(&b));
    prop_assert!(combined.allclose(&whole));
  }
}


#[test]
fn shape_scenario() {
  let path = path(4, 10, 3);
  assert_eq!(sig(&path, 3, &SigOptions::new()).dims(), &[4, 39]);
  assert_eq!(sig(&path, 3, &SigOptions::new().stream(true)).dims(), &[4, 9, 39]);
  assert_eq!(sig(&path, 3, &SigOptions::new().zero_basepoint().stream(true)).dims(), &[4, 10, 39]);
}

#[test]
fn inversion_law() {
  for &channels in &[1, 2, 3, 6] {
    for depth in 1..=3 {
      let path = path(2, 5, channels);
      let b = Tensor::new(&[2, channels], (0..2 * channels).map(|i| i as f64 * 0.05 ).collect());
      // Reversed path with the basepoint as its new last point
      let reversed = path.flip(1).concat(&b.reshape(&[2, 1, channels]), 1);
      let options = SigOptions::new().basepoint(&b.tracked()).inverse(true);
      let inverted = sig(&path, depth, &options);
      let expected = sig(&reversed, depth, &SigOptions::new());
      assert!(inverted.allclose(&expected), "channels {channels} depth {depth}");

      // Entry i belongs to the last i + 2 points of the reversed path
      let streamed = sig(&path, depth, &options.clone().stream(true));
      let points = reversed.dims()[1];
      for i in 0..5 {
        let suffix = sig(&reversed.narrow(1, points - 2 - i, i + 2), depth, &SigOptions::new());
        let entry = streamed.narrow(1, i, 1).reshape(suffix.dims());
        assert!(entry.allclose(&suffix), "channels {channels} depth {depth} entry {i}");
      }
    }
  }
}

#[test]
fn streaming_equivalence() {
  let path = path(3, 6, 2);
  let b = Tensor::new(&[3,2], vec![0.5, 0.0, -0.5, 1.0, 0.0, 0.0]).tracked();
  for &inverse in &[false, true] {
    let options = SigOptions::new().basepoint(&b).inverse(inverse);
    let streamed = sig(&path, 3, &options.clone().stream(true));
    assert_eq!(streamed.dims(), &[3, 6, 14]);
    for k in 0..6 {
      let prefix = sig(&path.narrow(1, 0, k + 1), 3, &options);
      assert!(streamed.narrow(1, k, 1).reshape(&[3, 14]).allclose(&prefix));
    }
    let streamed = sig(&path, 3, &SigOptions::new().inverse(inverse).stream(true));
    assert_eq!(streamed.dims(), &[3, 5, 14]);
    for k in 0..5 {
      let prefix = sig(&path.narrow(1, 0, k + 2), 3, &SigOptions::new().inverse(inverse));
      assert!(streamed.narrow(1, k, 1).reshape(&[3, 14]).allclose(&prefix));
    }
  }
}

#[test]
fn initial_composition() {
  let (head, tail) = (path(2, 4, 3), path(2, 5, 3).flip(1));
  let b0 = Tensor::new(&[2,3], vec![0.2, 0.1, 0.0, -0.3, 0.4, 0.1]);
  for &inverse in &[false, true] {
    // Composed from two calls
    let (p0, p1, b) = (head.trained(), tail.trained(), b0.trained());
    let options = SigOptions::new().basepoint(&b).inverse(inverse);
    let initial = microsig::signature(&p0, 3, &options).unwrap();
    let joint = p0.narrow(1, 3, 1).reshape(&[2,3]);
    let options = SigOptions::new().basepoint(&joint).initial(&initial).inverse(inverse);
    let composed = microsig::signature(&p1, 3, &options).unwrap();
    composed.sum().backward().unwrap();

    // In one go
    let (q0, q1, c) = (head.trained(), tail.trained(), b0.trained());
    let options = SigOptions::new().basepoint(&c).inverse(inverse);
    let whole = microsig::signature(&q0.concat(&q1, 1), 3, &options).unwrap();
    whole.sum().backward().unwrap();

    assert!(composed.allclose(&whole));
    assert!(p0.grad().unwrap().allclose_tol(q0.grad().unwrap(), 1e-6, 1e-9));
    assert!(p1.grad().unwrap().allclose_tol(q1.grad().unwrap(), 1e-6, 1e-9));
    assert!(b.grad().unwrap().allclose_tol(c.grad().unwrap(), 1e-6, 1e-9));
  }
}

#[test]
fn gradients() {
  let b = Tensor::new(&[2,3], vec![0.1, 0.0, -0.1, 0.3, 0.2, 0.0]).tracked();
  for &stream in &[false, true] {
    for &inverse in &[false, true] {
      let options = SigOptions::new().basepoint(&b).stream(stream).inverse(inverse);
      let diff = Variable::check_gradients(&path(2, 4, 3), |x| microsig::signature(x, 3, &options) ).unwrap();
      assert!(diff < 1e-6, "stream {stream} inverse {inverse}: {diff}");
    }
  }
}

#[test]
fn faults() {
  let path = path(2, 4, 3).tracked();
  let signature = |depth, options: &SigOptions<f64>| microsig::signature(&path, depth, options).unwrap_err();
  assert_eq!(signature(0, &SigOptions::new()), SigError::InvalidDepth(0));
  let wrong = Tensor::zeros(&[2,2]).tracked();
  assert!(matches!(signature(2, &SigOptions::new().basepoint(&wrong)), SigError::ShapeMismatch { tensor: "basepoint", .. }));
  assert!(matches!(signature(2, &SigOptions::new().initial(&wrong)), SigError::ShapeMismatch { tensor: "initial", .. }));
  let short = Tensor::<f64>::zeros(&[2,1,3]).tracked();
  assert_eq!(
    microsig::signature(&short, 2, &SigOptions::new()).unwrap_err(),
    SigError::PathTooShort { required: 2, found: 1 },
  );
  let single = microsig::signature(&short, 2, &SigOptions { basepoint: Basepoint::Zero, ..SigOptions::default() }).unwrap();
  assert_eq!(single.dims(), &[2, 12]);
}

#[test]
fn path_queries_continue_streams() {
  let points = path(2, 8, 3);
  let b = last_point(&path(2, 3, 3)).tracked();
  let mut queries = microsig::Path::new(&points.narrow(1, 0, 5).tracked(), 2, &Basepoint::Point(b.clone())).unwrap();
  queries.update(&points.narrow(1, 5, 3).tracked()).unwrap();
  let expected = sig(&points, 2, &SigOptions::new().basepoint(&b));
  assert!(queries.signature(..).unwrap().allclose(&expected));
  assert!(queries.signature(2..7).unwrap().allclose(&sig(&points.narrow(1, 2, 5), 2, &SigOptions::new())));
}
