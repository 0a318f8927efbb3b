use itertools::izip;
use ndarray::prelude::*;

/**
Compute the SHAP values of a single example for a linear model with independent features. The contribution of each feature to the logit is its weight times its distance from the training mean, and the returned value is the logit of the mean example, to which the contributions sum back up.
*/
pub fn compute_shap(
	example: ArrayView1<f64>,
	bias: f64,
	weights: ArrayView1<f64>,
	means: &[f64],
	mut shap_values: ArrayViewMut1<f64>,
) -> f64 {
	let baseline = bias
		+ weights
			.iter()
			.zip(means.iter())
			.map(|(weight, mean)| weight * mean)
			.sum::<f64>();
	for (shap_value, weight, feature, mean) in izip!(shap_values.iter_mut(), weights, example, means)
	{
		*shap_value = weight * (feature - mean);
	}
	baseline
}

#[test]
fn test_contributions_sum_to_logit() {
	let weights = array![2.0, -1.0];
	let means = [0.5, 1.0];
	let example = array![1.0, 3.0];
	let mut shap_values = Array1::zeros(2);
	let baseline = compute_shap(example.view(), 0.25, weights.view(), &means, shap_values.view_mut());
	assert_eq!(shap_values, array![1.0, -2.0]);
	let logit = 0.25 + weights.dot(&example);
	assert!((baseline + shap_values.sum() - logit).abs() < 1e-12);
}
