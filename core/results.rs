/*!
This module appends result records to the CSV result tables and writes attribution blobs.

Every table is opened in append mode and the header is written only when the file is empty, so reruns add rows below the earlier ones.
*/

use crate::{attribution::AggregatedAttribution, config::Settings};
use anyhow::{format_err, Context, Result};
use ndarray::prelude::*;
use std::{
	fs::OpenOptions,
	io::{Read, Write},
	path::{Path, PathBuf},
};

pub const RUN_RESULTS_FILE_NAME: &str = "pred_results.csv";
pub const ROC_CURVES_FILE_NAME: &str = "roc_curves.csv";
pub const AUC_RESULTS_FILE_NAME: &str = "auc_results.csv";

/// The run of the records aggregated over every run.
pub const AGGREGATE_RUN: i64 = -1;

/// The held out performance of one run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunRecord {
	pub featureset: String,
	pub target: String,
	pub method: String,
	pub run: i64,
	pub n_lags: Option<usize>,
	pub optimized: bool,
	pub max_depth: Option<usize>,
	pub n_features: usize,
	pub n_samples: usize,
	pub train_accuracy: f64,
	pub test_accuracy: f64,
	pub test_precision: f64,
	pub test_recall: f64,
	pub test_f1_score: f64,
	pub test_support: u64,
}

/// One point of the aggregated ROC curve.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RocRecord {
	pub featureset: String,
	pub target: String,
	pub method: String,
	pub run: i64,
	pub n_lags: Option<usize>,
	pub optimized: bool,
	pub max_depth: Option<usize>,
	pub fpr: f64,
	pub tpr: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AucRecord {
	pub featureset: String,
	pub target: String,
	pub method: String,
	pub run: i64,
	pub n_lags: Option<usize>,
	pub optimized: bool,
	pub max_depth: Option<usize>,
	pub auc_mean: f64,
	pub auc_std: f64,
}

/// The test rows whose attributions were computed, as written to `X_test_<key>.ob`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TestRowsBlob {
	pub feature_names: Vec<String>,
	pub rows: Array2<f64>,
}

/// The attributions, as written to `shap_<key>.ob`. There is one matrix per model output.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttributionBlob {
	pub feature_names: Vec<String>,
	pub outputs: Vec<Array2<f64>>,
}

/// The key naming the attribution blobs of one experiment, `<featureset>_<method>_<n_lags>_lags`, suffixed with `_optimized` for tuned runs. An unlagged feature set has 0 lags.
pub fn attribution_key(featureset: &str, method: &str, n_lags: Option<usize>, optimized: bool) -> String {
	format!(
		"{}_{}_{}_lags{}",
		featureset,
		method,
		n_lags.unwrap_or(0),
		if optimized { "_optimized" } else { "" }
	)
}

#[derive(Debug, Clone)]
pub struct ResultStore {
	pub results_dir: PathBuf,
	pub attributions_dir: PathBuf,
}

impl ResultStore {
	pub fn new(results_dir: PathBuf, attributions_dir: PathBuf) -> ResultStore {
		ResultStore {
			results_dir,
			attributions_dir,
		}
	}

	pub fn from_settings(settings: &Settings) -> ResultStore {
		ResultStore::new(
			settings.results_dir.clone(),
			settings.attributions_dir.clone(),
		)
	}

	pub fn append_runs(&self, records: &[RunRecord]) -> Result<()> {
		self.append(RUN_RESULTS_FILE_NAME, records)
	}

	pub fn append_roc(&self, records: &[RocRecord]) -> Result<()> {
		self.append(ROC_CURVES_FILE_NAME, records)
	}

	pub fn append_auc(&self, records: &[AucRecord]) -> Result<()> {
		self.append(AUC_RESULTS_FILE_NAME, records)
	}

	fn append<T: serde::Serialize>(&self, file_name: &str, records: &[T]) -> Result<()> {
		std::fs::create_dir_all(&self.results_dir).with_context(|| {
			format!("failed to create the results directory {}", self.results_dir.display())
		})?;
		let path = self.results_dir.join(file_name);
		let file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&path)
			.with_context(|| format!("failed to open {}", path.display()))?;
		let is_empty = file.metadata()?.len() == 0;
		let mut writer = csv::WriterBuilder::new()
			.has_headers(is_empty)
			.from_writer(file);
		for record in records {
			writer
				.serialize(record)
				.with_context(|| format!("failed to write a record to {}", path.display()))?;
		}
		writer.flush()?;
		Ok(())
	}

	/// Write `X_test_<key>.ob` and `shap_<key>.ob` and return their paths.
	pub fn write_attributions(
		&self,
		key: &str,
		feature_names: &[String],
		attribution: &AggregatedAttribution,
	) -> Result<(PathBuf, PathBuf)> {
		std::fs::create_dir_all(&self.attributions_dir).with_context(|| {
			format!(
				"failed to create the attributions directory {}",
				self.attributions_dir.display()
			)
		})?;
		let test_rows_path = self.attributions_dir.join(format!("X_test_{}.ob", key));
		write_blob(
			&test_rows_path,
			&TestRowsBlob {
				feature_names: feature_names.to_owned(),
				rows: attribution.x_test.clone(),
			},
		)?;
		let attribution_path = self.attributions_dir.join(format!("shap_{}.ob", key));
		write_blob(
			&attribution_path,
			&AttributionBlob {
				feature_names: feature_names.to_owned(),
				outputs: attribution.outputs.clone(),
			},
		)?;
		Ok((test_rows_path, attribution_path))
	}
}

/// Write a version byte followed by the MessagePack encoding of `value`.
pub fn write_blob<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
	let file = std::fs::File::create(path)
		.with_context(|| format!("failed to create {}", path.display()))?;
	let mut writer = std::io::BufWriter::new(file);
	writer.write_all(&[0])?;
	rmp_serde::encode::write_named(&mut writer, value)?;
	writer.flush()?;
	Ok(())
}

/// Read a blob written by [`write_blob`](fn.write_blob.html).
pub fn read_blob<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
	let file = std::fs::File::open(path)
		.with_context(|| format!("failed to open {}", path.display()))?;
	let mut reader = std::io::BufReader::new(file);
	let mut major_version = [0u8; 1];
	reader.read_exact(&mut major_version)?;
	let major_version = major_version[0];
	if major_version != 0 {
		return Err(format_err!("unknown major version {}", major_version));
	}
	let value = rmp_serde::from_read(&mut reader)?;
	Ok(value)
}

#[cfg(test)]
fn auc_record(auc_mean: f64) -> AucRecord {
	AucRecord {
		featureset: "mems".to_owned(),
		target: "adherent".to_owned(),
		method: "RF".to_owned(),
		run: AGGREGATE_RUN,
		n_lags: None,
		optimized: false,
		max_depth: Some(2),
		auc_mean,
		auc_std: 0.05,
	}
}

#[test]
fn test_append_writes_header_once() {
	let dir = tempfile::tempdir().unwrap();
	let store = ResultStore::new(dir.path().join("results"), dir.path().join("attributions"));
	store.append_auc(&[auc_record(0.7)]).unwrap();
	store.append_auc(&[auc_record(0.8)]).unwrap();
	let contents =
		std::fs::read_to_string(dir.path().join("results").join(AUC_RESULTS_FILE_NAME)).unwrap();
	insta::assert_snapshot!(contents, @r###"
 featureset,target,method,run,n_lags,optimized,max_depth,auc_mean,auc_std
 mems,adherent,RF,-1,,false,2,0.7,0.05
 mems,adherent,RF,-1,,false,2,0.8,0.05
 "###);
	let mut reader =
		csv::Reader::from_path(dir.path().join("results").join(AUC_RESULTS_FILE_NAME)).unwrap();
	let records: Vec<AucRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
	assert_eq!(records, vec![auc_record(0.7), auc_record(0.8)]);
}

#[test]
fn test_attribution_key() {
	assert_eq!(attribution_key("mems", "RF", Some(3), false), "mems_RF_3_lags");
	assert_eq!(
		attribution_key("mems", "SVM", None, true),
		"mems_SVM_0_lags_optimized"
	);
}

#[test]
fn test_blobs() {
	let dir = tempfile::tempdir().unwrap();
	let store = ResultStore::new(dir.path().join("results"), dir.path().join("attributions"));
	let attribution = AggregatedAttribution {
		outputs: vec![array![[0.5, -0.5]], array![[-0.5, 0.5]]],
		x_test: array![[1.0, 2.0]],
		test_indices: vec![3],
	};
	let feature_names = vec!["steps".to_owned(), "mood".to_owned()];
	let (test_rows_path, attribution_path) = store
		.write_attributions("mems_RF_1_lags", &feature_names, &attribution)
		.unwrap();
	assert!(test_rows_path.ends_with("X_test_mems_RF_1_lags.ob"));
	let test_rows: TestRowsBlob = read_blob(&test_rows_path).unwrap();
	assert_eq!(test_rows.rows, attribution.x_test);
	let blob: AttributionBlob = read_blob(&attribution_path).unwrap();
	assert_eq!(blob.outputs, attribution.outputs);
	assert_eq!(blob.feature_names, feature_names);
}
