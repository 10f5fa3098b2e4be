use microsig::{ Tensor, SigOptions, LogSignatureMode, Engine, lyndon_brackets };

fn main() {
  let engine = Engine::default();

  // Three channels, depth three
  let path = Tensor::<f64>::randn(&[1, 8, 3]).tracked();

  let words = engine.logsignature(&path, 3, LogSignatureMode::Words, &SigOptions::new()).unwrap();
  let brackets = engine.logsignature(&path, 3, LogSignatureMode::Brackets, &SigOptions::new()).unwrap();
  let expand = engine.logsignature(&path, 3, LogSignatureMode::Expand, &SigOptions::new()).unwrap();

  println!("Expanded logarithm has {} coefficients", expand.dims()[1]);

  // Both Lyndon encodings side by side
  for (i, bracket) in lyndon_brackets(3, 3).iter().enumerate() {
    println!(
      "{:>12}  words {:>9.5}  brackets {:>9.5}",
      bracket.to_string(),
      words.at(&[0, i]).item(),
      brackets.at(&[0, i]).item(),
    );
  }

  // Streamed log-signatures share the engine's basis tables
  let options = SigOptions::new().zero_basepoint().stream(true);
  let streamed = engine.logsignature(&path, 3, LogSignatureMode::Brackets, &options).unwrap();
  println!("Streamed shape {:?}, cached bases: {}", streamed.dims(), engine.bases().len());
}
