use crate::Error;
use ndarray::{concatenate, prelude::*};

/// The SHAP values of one fold's test rows.
#[derive(Debug, Clone)]
pub struct FoldAttribution {
	/// One matrix per model output, each with one row per test row and one column per feature.
	pub outputs: Vec<Array2<f64>>,
	/// The rows of the design matrix the matrices' rows belong to.
	pub test_indices: Vec<usize>,
}

/// The attributions of every fold of every run, stacked.
#[derive(Debug, Clone)]
pub struct AggregatedAttribution {
	/// One matrix per model output. Row `i` of every matrix explains row `i` of `x_test`.
	pub outputs: Vec<Array2<f64>>,
	/// The unscaled test rows in the order their attributions were stacked.
	pub x_test: Array2<f64>,
	pub test_indices: Vec<usize>,
}

/**
Stack the attributions of `folds` along rows, keeping each output separate, and gather the matching rows of `features`.

Every fold must have the same number of outputs, as many rows in each output as it has test indices, and the same number of columns in every matrix.
*/
pub fn aggregate_attributions(
	folds: &[FoldAttribution],
	features: ArrayView2<f64>,
) -> Result<AggregatedAttribution, Error> {
	let first = folds
		.first()
		.ok_or_else(|| Error::AttributionMisaligned("there are no folds".to_owned()))?;
	let n_outputs = first.outputs.len();
	let n_columns = first
		.outputs
		.first()
		.map(|output| output.ncols())
		.ok_or_else(|| Error::AttributionMisaligned("the first fold has no outputs".to_owned()))?;
	for (fold_index, fold) in folds.iter().enumerate() {
		if fold.outputs.len() != n_outputs {
			return Err(Error::AttributionMisaligned(format!(
				"fold {} has {} outputs but fold 0 has {}",
				fold_index,
				fold.outputs.len(),
				n_outputs
			)));
		}
		for output in fold.outputs.iter() {
			if output.nrows() != fold.test_indices.len() {
				return Err(Error::AttributionMisaligned(format!(
					"fold {} has {} attribution rows for {} test rows",
					fold_index,
					output.nrows(),
					fold.test_indices.len()
				)));
			}
			if output.ncols() != n_columns {
				return Err(Error::AttributionMisaligned(format!(
					"fold {} has {} attribution columns but fold 0 has {}",
					fold_index,
					output.ncols(),
					n_columns
				)));
			}
		}
	}
	let test_indices: Vec<usize> = folds
		.iter()
		.flat_map(|fold| fold.test_indices.iter().copied())
		.collect();
	if let Some(index) = test_indices.iter().find(|index| **index >= features.nrows()) {
		return Err(Error::AttributionMisaligned(format!(
			"test row {} is out of range for {} rows",
			index,
			features.nrows()
		)));
	}
	let outputs = (0..n_outputs)
		.map(|output_index| {
			let views: Vec<ArrayView2<f64>> = folds
				.iter()
				.map(|fold| fold.outputs[output_index].view())
				.collect();
			concatenate(Axis(0), &views)
				.map_err(|error| Error::AttributionMisaligned(error.to_string()))
		})
		.collect::<Result<Vec<_>, Error>>()?;
	let x_test = features.select(Axis(0), &test_indices);
	Ok(AggregatedAttribution {
		outputs,
		x_test,
		test_indices,
	})
}

#[cfg(test)]
fn fold(offset: usize, n_rows: usize, n_outputs: usize) -> FoldAttribution {
	FoldAttribution {
		outputs: (0..n_outputs)
			.map(|output| Array2::from_elem((n_rows, 4), output as f64))
			.collect(),
		test_indices: (offset..offset + n_rows).collect(),
	}
}

#[test]
fn test_stacks_folds_per_class() {
	let features = Array2::from_shape_fn((32, 4), |(row, _)| row as f64);
	let folds = vec![fold(0, 10, 2), fold(10, 15, 2), fold(25, 7, 2)];
	let aggregated = aggregate_attributions(&folds, features.view()).unwrap();
	assert_eq!(aggregated.outputs.len(), 2);
	assert_eq!(aggregated.outputs[0].dim(), (32, 4));
	assert_eq!(aggregated.outputs[1].dim(), (32, 4));
	assert!(aggregated.outputs[0].iter().all(|value| *value == 0.0));
	assert!(aggregated.outputs[1].iter().all(|value| *value == 1.0));
	assert_eq!(aggregated.x_test.nrows(), 32);
	assert_eq!(aggregated.x_test[[31, 0]], 31.0);
}

#[test]
fn test_x_test_follows_test_indices() {
	let features = Array2::from_shape_fn((6, 4), |(row, _)| row as f64);
	let folds = vec![
		FoldAttribution {
			outputs: vec![Array2::zeros((2, 4))],
			test_indices: vec![4, 1],
		},
		FoldAttribution {
			outputs: vec![Array2::zeros((1, 4))],
			test_indices: vec![0],
		},
	];
	let aggregated = aggregate_attributions(&folds, features.view()).unwrap();
	assert_eq!(aggregated.x_test.column(0), array![4.0, 1.0, 0.0]);
}

#[test]
fn test_misaligned() {
	let features = Array2::zeros((32, 4));
	let mut short = fold(10, 15, 1);
	short.test_indices.pop();
	assert!(matches!(
		aggregate_attributions(&[fold(0, 10, 1), short], features.view()),
		Err(Error::AttributionMisaligned(_))
	));
	assert!(matches!(
		aggregate_attributions(&[fold(0, 10, 1), fold(10, 15, 2)], features.view()),
		Err(Error::AttributionMisaligned(_))
	));
	assert!(matches!(
		aggregate_attributions(&[], features.view()),
		Err(Error::AttributionMisaligned(_))
	));
}
