use super::{mean::Mean, StreamingMetric};

/// The accuracy is the proportion of examples where predicted == label.
#[derive(Debug, Clone, Default)]
pub struct Accuracy(Mean);

impl Accuracy {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StreamingMetric<'_> for Accuracy {
	/// (predicted, actual)
	type Input = (usize, usize);
	type Output = Option<f64>;

	fn update(&mut self, value: Self::Input) {
		self.0.update(if value.0 == value.1 { 1.0 } else { 0.0 })
	}

	fn merge(&mut self, other: Self) {
		self.0.merge(other.0)
	}

	fn finalize(self) -> Option<f64> {
		self.0.finalize()
	}
}

#[test]
fn test_accuracy_is_fraction_of_matches() {
	use rand::{Rng, SeedableRng};
	use rand_xoshiro::Xoshiro256Plus;
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	for _ in 0..50 {
		let n = rng.gen_range(1..200);
		let pairs: Vec<(usize, usize)> = (0..n)
			.map(|_| (rng.gen_range(0..2), rng.gen_range(0..2)))
			.collect();
		let mut accuracy = Accuracy::new();
		for pair in pairs.iter() {
			accuracy.update(*pair);
		}
		let accuracy = accuracy.finalize().unwrap();
		let n_matches = pairs.iter().filter(|(a, b)| a == b).count();
		assert!((0.0..=1.0).contains(&accuracy));
		assert!((accuracy - n_matches as f64 / n as f64).abs() < 1e-12);
	}
}
