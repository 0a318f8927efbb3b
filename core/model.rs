/*!
This module defines the four classifier families behind one surface. [`ModelOptions`] holds the train options of a family and [`Model`] the fitted classifier. The [`Registry`] maps a family identifier to a factory producing fresh options for a seed, the family's hyperparameter grid, and how many threads its grid search may use.
*/

use crate::{config::ExplainerSettings, grid, Error};
use lagsweep_kernel::{
	kmeans_background, SamplingExplainer, SvmClassifier, SvmTrainOptions,
};
use lagsweep_linear::BinaryClassifier;
use lagsweep_tree::{
	BoostingClassifier, BoostingTrainOptions, ForestClassifier, ForestTrainOptions,
};
use ndarray::prelude::*;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Family {
	LogisticR,
	RF,
	XGB,
	SVM,
}

impl Family {
	pub fn name(&self) -> &'static str {
		match self {
			Family::LogisticR => "LogisticR",
			Family::RF => "RF",
			Family::XGB => "XGB",
			Family::SVM => "SVM",
		}
	}
}

impl std::fmt::Display for Family {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

impl FromStr for Family {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"LogisticR" => Ok(Family::LogisticR),
			"RF" => Ok(Family::RF),
			"XGB" => Ok(Family::XGB),
			"SVM" => Ok(Family::SVM),
			_ => Err(Error::UnknownFamily(s.to_owned())),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelOptions {
	LogisticR(lagsweep_linear::TrainOptions),
	RF(ForestTrainOptions),
	XGB(BoostingTrainOptions),
	SVM(SvmTrainOptions),
}

impl ModelOptions {
	pub fn family(&self) -> Family {
		match self {
			ModelOptions::LogisticR(_) => Family::LogisticR,
			ModelOptions::RF(_) => Family::RF,
			ModelOptions::XGB(_) => Family::XGB,
			ModelOptions::SVM(_) => Family::SVM,
		}
	}

	/// Train a fresh model with these options.
	pub fn train(&self, features: ArrayView2<f64>, labels: ArrayView1<usize>) -> Result<Model, Error> {
		let model = match self {
			ModelOptions::LogisticR(options) => {
				Model::LogisticR(BinaryClassifier::train(features, labels, options)?)
			}
			ModelOptions::RF(options) => {
				Model::RF(ForestClassifier::train(features, labels, options)?)
			}
			ModelOptions::XGB(options) => {
				Model::XGB(BoostingClassifier::train(features, labels, options)?)
			}
			ModelOptions::SVM(options) => {
				Model::SVM(SvmClassifier::train(features, labels, options)?)
			}
		};
		Ok(model)
	}
}

#[derive(Debug)]
pub enum Model {
	LogisticR(BinaryClassifier),
	RF(ForestClassifier),
	XGB(BoostingClassifier),
	SVM(SvmClassifier),
}

impl Model {
	pub fn family(&self) -> Family {
		match self {
			Model::LogisticR(_) => Family::LogisticR,
			Model::RF(_) => Family::RF,
			Model::XGB(_) => Family::XGB,
			Model::SVM(_) => Family::SVM,
		}
	}

	/// The probability of label 1 for each row of `features`.
	pub fn predict_probabilities(&self, features: ArrayView2<f64>) -> Array1<f64> {
		match self {
			Model::LogisticR(model) => model.predict_probabilities(features),
			Model::RF(model) => model.predict_probabilities(features),
			Model::XGB(model) => model.predict_probabilities(features),
			Model::SVM(model) => model.predict_probabilities(features),
		}
	}

	pub fn predict(&self, features: ArrayView2<f64>) -> Array1<usize> {
		self.predict_probabilities(features)
			.mapv(|probability| usize::from(probability > 0.5))
	}

	/// The out-of-bag accuracy of a random forest trained with out-of-bag scoring.
	pub fn oob_accuracy(&self) -> Option<f64> {
		match self {
			Model::RF(model) => model.oob_accuracy,
			_ => None,
		}
	}

	/**
	Compute the SHAP values of each row of `features`.

	`LogisticR` and `XGB` produce a single matrix, in logit space. `RF` and `SVM` produce one matrix per class, the values of class 0 being the negation of those of class 1. `SVM`, the family without a structural explainer, is explained by sampling against a k-means summary of `background`, the training partition the model was fit on.
	*/
	pub fn explain(
		&self,
		features: ArrayView2<f64>,
		background: ArrayView2<f64>,
		settings: &ExplainerSettings,
		seed: u64,
	) -> Result<Vec<Array2<f64>>, Error> {
		let outputs = match self {
			Model::LogisticR(model) => vec![model.compute_shap_values(features)],
			Model::RF(model) => per_class(model.compute_shap_values(features)),
			Model::XGB(model) => vec![model.compute_shap_values(features)],
			Model::SVM(model) => {
				let background = kmeans_background(background, settings.n_background, seed)?;
				let explainer = SamplingExplainer {
					background: &background,
					n_samples: settings.n_samples,
					seed,
				};
				per_class(explainer.explain(features, &|features| {
					model.predict_probabilities(features)
				})?)
			}
		};
		Ok(outputs)
	}
}

fn per_class(positive: Array2<f64>) -> Vec<Array2<f64>> {
	vec![positive.mapv(|value| -value), positive]
}

/// The registry entry of one family.
#[derive(Clone)]
pub struct FamilySpec {
	pub family: Family,
	/// Produces the untuned options of a run with the given seed.
	pub factory: fn(u64) -> ModelOptions,
	/// Produces the hyperparameter grid searched by tuned runs, in search order.
	pub grid: fn(u64) -> Vec<ModelOptions>,
	/// The number of threads of the grid search. `None` uses every core.
	pub n_jobs: Option<usize>,
}

impl std::fmt::Debug for FamilySpec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FamilySpec")
			.field("family", &self.family)
			.field("n_jobs", &self.n_jobs)
			.finish()
	}
}

#[derive(Debug, Clone)]
pub struct Registry {
	pub families: Vec<FamilySpec>,
}

impl Default for Registry {
	fn default() -> Self {
		Registry {
			families: vec![
				FamilySpec {
					family: Family::LogisticR,
					factory: |_| ModelOptions::LogisticR(lagsweep_linear::TrainOptions::default()),
					grid: grid::logistic_regression_grid,
					n_jobs: None,
				},
				FamilySpec {
					family: Family::RF,
					factory: |seed| {
						ModelOptions::RF(ForestTrainOptions {
							seed,
							..Default::default()
						})
					},
					grid: grid::random_forest_grid,
					n_jobs: None,
				},
				FamilySpec {
					family: Family::XGB,
					factory: |_| ModelOptions::XGB(BoostingTrainOptions::default()),
					grid: grid::boosting_grid,
					n_jobs: Some(3),
				},
				FamilySpec {
					family: Family::SVM,
					factory: |_| ModelOptions::SVM(SvmTrainOptions::default()),
					grid: grid::svm_grid,
					n_jobs: Some(1),
				},
			],
		}
	}
}

impl Registry {
	pub fn get(&self, name: &str) -> Result<&FamilySpec, Error> {
		let family: Family = name.parse()?;
		self.get_family(family)
	}

	pub fn get_family(&self, family: Family) -> Result<&FamilySpec, Error> {
		self.families
			.iter()
			.find(|spec| spec.family == family)
			.ok_or_else(|| Error::UnknownFamily(family.to_string()))
	}
}

#[test]
fn test_registry() {
	let registry = Registry::default();
	assert_eq!(registry.get("SVM").unwrap().n_jobs, Some(1));
	assert_eq!(registry.get("XGB").unwrap().n_jobs, Some(3));
	assert_eq!(registry.get("RF").unwrap().n_jobs, None);
	assert!(matches!(
		registry.get("KNN"),
		Err(Error::UnknownFamily(name)) if name == "KNN"
	));
	let options = (registry.get("RF").unwrap().factory)(4);
	assert_eq!(
		options,
		ModelOptions::RF(ForestTrainOptions {
			seed: 4,
			..Default::default()
		})
	);
	assert_eq!(options.family(), Family::RF);
}

#[test]
fn test_explain_shapes() {
	let features = array![
		[0.0, 0.1],
		[0.1, 0.0],
		[0.2, 0.3],
		[0.8, 0.9],
		[0.9, 0.7],
		[1.0, 1.0],
	];
	let labels = array![0, 0, 0, 1, 1, 1];
	let settings = ExplainerSettings::default();
	let logistic = ModelOptions::LogisticR(Default::default())
		.train(features.view(), labels.view())
		.unwrap();
	let outputs = logistic
		.explain(features.view(), features.view(), &settings, 0)
		.unwrap();
	assert_eq!(outputs.len(), 1);
	assert_eq!(outputs[0].dim(), (6, 2));
	let forest = ModelOptions::RF(ForestTrainOptions {
		n_trees: 10,
		..Default::default()
	})
	.train(features.view(), labels.view())
	.unwrap();
	let outputs = forest
		.explain(features.view(), features.view(), &settings, 0)
		.unwrap();
	assert_eq!(outputs.len(), 2);
	assert_eq!(outputs[0], outputs[1].mapv(|value| -value));
	let boosting = ModelOptions::XGB(BoostingTrainOptions {
		n_trees: 10,
		max_depth: 2,
		min_child_weight: 0.1,
		..Default::default()
	})
	.train(features.view(), labels.view())
	.unwrap();
	let outputs = boosting
		.explain(features.view(), features.view(), &settings, 0)
		.unwrap();
	assert_eq!(outputs.len(), 1);
	assert_eq!(outputs[0].dim(), (6, 2));
	// Tree SHAP is exact, so each row's contributions sum to its logit minus the expected logit.
	let probabilities = boosting.predict_probabilities(features.view());
	let logits = probabilities.mapv(|probability| (probability / (1.0 - probability)).ln());
	let sums = outputs[0].sum_axis(Axis(1));
	let offsets = &logits - &sums;
	assert!(offsets.iter().all(|offset| (offset - offsets[0]).abs() < 1e-9));
}
