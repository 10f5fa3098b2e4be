use microsig::{ ops::*, Tensor, Path, Basepoint, LogSignatureMode };

fn main() {
  // Two random walks of 100 steps in 4 dimensions
  let steps = Tensor::<f64>::randn(&[2, 100, 4]).scale(0.1);
  let walk: Vec<f64> = {
    let steps = steps.to_vec();
    let mut walk = Vec::with_capacity(steps.len());
    for b in 0..2 {
      let mut position = [0.0; 4];
      for i in 0..100 {
        for c in 0..4 {
          position[c] += steps[(b * 100 + i) * 4 + c];
        }
        walk.extend_from_slice(&position);
      }
    }
    walk
  };
  let walk = Tensor::new(&[2, 100, 4], walk);

  let mut path = Path::new(&walk.narrow(1, 0, 60).tracked(), 3, &Basepoint::Zero).unwrap();

  // Any interval is answered from the stored streams
  for (start, end) in [(0, 10), (10, 50), (25, 60)] {
    let sig = path.signature(start..end).unwrap();
    println!("Signature of [{start}, {end}): level one {:?}", &sig.at(&[0]).to_vec()[..4]);
  }

  // Append the remaining points
  path.update(&walk.narrow(1, 60, 40).tracked()).unwrap();
  println!("Path now has {} points", path.len());

  let logsig = path.logsignature(50..100, LogSignatureMode::Brackets).unwrap();
  println!("Log-signature of [50, 100): {} coefficients", logsig.dims()[1]);
}
