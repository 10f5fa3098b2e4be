use microsig::{ ops::*, Tensor, SigOptions };

fn main() {
  // Signature of a quarter circle, to be matched by a learned path
  let arc: Vec<f64> = (0..16)
    .flat_map(|i| {
      let angle = std::f64::consts::FRAC_PI_2 * i as f64 / 15.0;
      [angle.cos(), angle.sin()]
    })
    .collect();
  let arc = Tensor::new(&[1, 16, 2], arc).tracked();
  let target = microsig::signature(&arc, 3, &SigOptions::new()).unwrap();

  // Start from a random path
  let path = Tensor::<f64>::randn(&[1, 16, 2]).trained();

  let learning_rate = 0.01;

  for step in 0..200 {
    // Squared distance between signatures
    let sig = microsig::signature(&path, 3, &SigOptions::new()).unwrap();
    let diff = &sig - &target;
    let loss = (&diff * &diff).sum();

    // Compute gradients
    loss.backward().unwrap();

    if step % 20 == 0 {
      println!("Step {step}: loss {}", loss.item());
    }

    // Gradient descent on the points themselves
    path.op_assign(path.grad().unwrap(), |p, g| *p -= g * learning_rate );

    // Reset gradients
    loss.reset();
  }
}
