use super::StreamingMetric;
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/**
`ClassificationMetrics` accumulates a confusion matrix from (predicted, actual) label pairs and computes accuracy along with precision, recall and F1 for each class. The summary precision, recall and F1 are macro averages: every class counts equally regardless of how many examples it has.
*/
#[derive(Debug, Clone)]
pub struct ClassificationMetrics {
	/// The shape of the confusion matrix is (n_classes x n_classes).
	confusion_matrix: Array2<u64>,
}

pub struct ClassificationMetricsInput<'a> {
	/// (n_examples), 0-indexed
	pub predictions: &'a [usize],
	/// (n_examples), 0-indexed
	pub labels: &'a [usize],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationMetricsOutput {
	pub class_metrics: Vec<ClassMetrics>,
	pub accuracy: f64,
	pub precision: f64,
	pub recall: f64,
	pub f1_score: f64,
	pub support: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
	pub true_positives: u64,
	pub false_positives: u64,
	pub true_negatives: u64,
	pub false_negatives: u64,
	pub precision: f64,
	pub recall: f64,
	pub f1_score: f64,
	pub support: u64,
}

impl ClassificationMetrics {
	pub fn new(n_classes: usize) -> Self {
		//                                           prediction    label
		//                                               |           |
		//                                               v           v
		let confusion_matrix = <Array2<u64>>::zeros((n_classes, n_classes));
		Self { confusion_matrix }
	}

	pub fn binary() -> Self {
		Self::new(2)
	}
}

impl<'a> StreamingMetric<'a> for ClassificationMetrics {
	type Input = ClassificationMetricsInput<'a>;
	type Output = ClassificationMetricsOutput;

	fn update(&mut self, input: Self::Input) {
		for (prediction, label) in input.predictions.iter().zip(input.labels.iter()) {
			self.confusion_matrix[(*prediction, *label)] += 1;
		}
	}

	fn merge(&mut self, other: Self) {
		self.confusion_matrix += &other.confusion_matrix;
	}

	fn finalize(self) -> ClassificationMetricsOutput {
		let n_classes = self.confusion_matrix.nrows();
		let n_examples = self.confusion_matrix.sum();
		let confusion_matrix = self.confusion_matrix;
		let class_metrics: Vec<_> = (0..n_classes)
			.map(|class_index| {
				let true_positives = confusion_matrix[(class_index, class_index)];
				let false_positives = confusion_matrix.row(class_index).sum() - true_positives;
				let false_negatives = confusion_matrix.column(class_index).sum() - true_positives;
				let true_negatives =
					n_examples - true_positives - false_positives - false_negatives;
				let precision = ratio(true_positives, true_positives + false_positives);
				let recall = ratio(true_positives, true_positives + false_negatives);
				let f1_score = if precision + recall > 0.0 {
					2.0 * (precision * recall) / (precision + recall)
				} else {
					0.0
				};
				ClassMetrics {
					true_positives,
					false_positives,
					true_negatives,
					false_negatives,
					precision,
					recall,
					f1_score,
					support: true_positives + false_negatives,
				}
			})
			.collect();
		let n_correct: u64 = confusion_matrix.diag().sum();
		let accuracy = ratio(n_correct, n_examples);
		let n_classes = n_classes.to_f64().unwrap();
		let precision = class_metrics.iter().map(|c| c.precision).sum::<f64>() / n_classes;
		let recall = class_metrics.iter().map(|c| c.recall).sum::<f64>() / n_classes;
		let f1_score = class_metrics.iter().map(|c| c.f1_score).sum::<f64>() / n_classes;
		ClassificationMetricsOutput {
			class_metrics,
			accuracy,
			precision,
			recall,
			f1_score,
			support: n_examples,
		}
	}
}

/// Divide two counts, treating an empty denominator as a score of zero.
fn ratio(numerator: u64, denominator: u64) -> f64 {
	if denominator == 0 {
		0.0
	} else {
		numerator.to_f64().unwrap() / denominator.to_f64().unwrap()
	}
}

#[test]
fn test_balanced() {
	let mut metrics = ClassificationMetrics::binary();
	metrics.update(ClassificationMetricsInput {
		predictions: &[1, 1, 1, 0, 0, 0, 0, 1],
		labels: &[1, 1, 1, 1, 0, 0, 0, 0],
	});
	let metrics = metrics.finalize();
	insta::assert_debug_snapshot!(metrics, @r###"
 ClassificationMetricsOutput {
     class_metrics: [
         ClassMetrics {
             true_positives: 3,
             false_positives: 1,
             true_negatives: 3,
             false_negatives: 1,
             precision: 0.75,
             recall: 0.75,
             f1_score: 0.75,
             support: 4,
         },
         ClassMetrics {
             true_positives: 3,
             false_positives: 1,
             true_negatives: 3,
             false_negatives: 1,
             precision: 0.75,
             recall: 0.75,
             f1_score: 0.75,
             support: 4,
         },
     ],
     accuracy: 0.75,
     precision: 0.75,
     recall: 0.75,
     f1_score: 0.75,
     support: 8,
 }
 "###);
}

#[test]
fn test_macro_average_ignores_support() {
	// Nine negatives predicted correctly, one positive missed.
	let mut metrics = ClassificationMetrics::binary();
	metrics.update(ClassificationMetricsInput {
		predictions: &[0; 10],
		labels: &[0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
	});
	let metrics = metrics.finalize();
	assert!((metrics.accuracy - 0.9).abs() < 1e-12);
	// The positive class never gets predicted, so its precision and recall are zero.
	assert_eq!(metrics.class_metrics[1].precision, 0.0);
	assert_eq!(metrics.class_metrics[1].recall, 0.0);
	assert!((metrics.recall - 0.5).abs() < 1e-12);
	assert!((metrics.precision - 0.45).abs() < 1e-12);
	assert_eq!(metrics.support, 10);
}

#[test]
fn test_merge() {
	let mut a = ClassificationMetrics::binary();
	a.update(ClassificationMetricsInput {
		predictions: &[1, 0],
		labels: &[1, 1],
	});
	let mut b = ClassificationMetrics::binary();
	b.update(ClassificationMetricsInput {
		predictions: &[0, 0],
		labels: &[0, 1],
	});
	a.merge(b);
	let metrics = a.finalize();
	assert_eq!(metrics.support, 4);
	assert!((metrics.accuracy - 0.5).abs() < 1e-12);
}
