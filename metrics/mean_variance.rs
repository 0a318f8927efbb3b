//! https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Welford's_online_algorithm

use super::Metric;
use num_traits::ToPrimitive;

/// The mean and population variance of a slice of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanVariance {
	pub mean: f64,
	pub variance: f64,
}

impl MeanVariance {
	pub fn std(&self) -> f64 {
		self.variance.sqrt()
	}
}

impl<'a> Metric<'a> for MeanVariance {
	type Input = &'a [f64];
	type Output = Option<MeanVariance>;

	fn compute(input: &'a [f64]) -> Option<MeanVariance> {
		if input.is_empty() {
			return None;
		}
		let mut mean = 0.0;
		let mut m2 = 0.0;
		for (i, value) in input.iter().enumerate() {
			let n = (i + 1).to_f64().unwrap();
			let delta = value - mean;
			mean += delta / n;
			m2 += delta * (value - mean);
		}
		Some(MeanVariance {
			mean,
			variance: m2 / input.len().to_f64().unwrap(),
		})
	}
}

#[test]
fn test_mean_variance() {
	let output = MeanVariance::compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
	assert!((output.mean - 5.0).abs() < 1e-12);
	assert!((output.variance - 4.0).abs() < 1e-12);
	assert!((output.std() - 2.0).abs() < 1e-12);
	assert_eq!(MeanVariance::compute(&[]), None);
}
