use itertools::izip;
use ndarray::prelude::*;

/**
A `MinMaxScaler` maps each column to the range [0, 1] using the minimum and maximum seen during `fit`. [Learn more](https://en.wikipedia.org/wiki/Feature_scaling#Rescaling_(min-max_normalization)).

`feature_value = (value - min) / (max - min)`

| value | feature value (min = 2, max = 6) |
|-------|----------------------------------|
| 2.0   | 0.0                              |
| 3.0   | 0.25                             |
| 6.0   | 1.0                              |

Columns whose minimum equals their maximum scale to 0. NaN values are ignored when fitting and stay NaN. Values outside the fitted range are not clipped, so a test partition can land slightly outside [0, 1].
*/
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
	pub min: Vec<f64>,
	pub max: Vec<f64>,
}

impl MinMaxScaler {
	pub fn fit(features: ArrayView2<f64>) -> MinMaxScaler {
		let (min, max) = features
			.axis_iter(Axis(1))
			.map(|column| {
				column
					.iter()
					.filter(|value| !value.is_nan())
					.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
						(min.min(*value), max.max(*value))
					})
			})
			.map(|(min, max)| if min > max { (0.0, 0.0) } else { (min, max) })
			.unzip();
		MinMaxScaler { min, max }
	}

	pub fn transform(&self, features: ArrayView2<f64>) -> Array2<f64> {
		let mut scaled = features.to_owned();
		for (mut column, min, max) in izip!(scaled.axis_iter_mut(Axis(1)), &self.min, &self.max) {
			let range = max - min;
			column.mapv_inplace(|value| {
				if value.is_nan() {
					value
				} else if range == 0.0 {
					0.0
				} else {
					(value - min) / range
				}
			});
		}
		scaled
	}

	pub fn fit_transform(features: ArrayView2<f64>) -> (MinMaxScaler, Array2<f64>) {
		let scaler = MinMaxScaler::fit(features);
		let scaled = scaler.transform(features);
		(scaler, scaled)
	}
}

#[test]
fn test_min_max_scaler() {
	let train = array![[2.0, 5.0], [3.0, 5.0], [6.0, 5.0]];
	let (scaler, scaled) = MinMaxScaler::fit_transform(train.view());
	assert_eq!(scaled, array![[0.0, 0.0], [0.25, 0.0], [1.0, 0.0]]);
	let test = array![[10.0, 1.0], [f64::NAN, 5.0]];
	let scaled = scaler.transform(test.view());
	assert_eq!(scaled[[0, 0]], 2.0);
	assert_eq!(scaled[[0, 1]], 0.0);
	assert!(scaled[[1, 0]].is_nan());
}
