use crate::Error;
use lagsweep_dataframe::DataFrame;
use lagsweep_features::{lag, lagged_name};
use ndarray::prelude::*;
use std::{ops::RangeInclusive, str::FromStr};

/// The time granularity of a feature set. It names the time column used to order lags and to exclude the ramp-up period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
	StudyDay,
	StudyWeek,
	StudyMonth,
}

impl Horizon {
	pub fn column_name(&self) -> &'static str {
		match self {
			Horizon::StudyDay => "study_day",
			Horizon::StudyWeek => "study_week",
			Horizon::StudyMonth => "study_month",
		}
	}

	/// Observations at or before this time step fall in the ramp-up period, while participants were still getting used to the study.
	pub fn ramp_up(&self) -> f64 {
		match self {
			Horizon::StudyDay => 30.0,
			Horizon::StudyWeek => 4.0,
			Horizon::StudyMonth => 1.0,
		}
	}

	/// The lag counts tried by the lag sweep. Monthly data is too short for more than four.
	pub fn lag_range(&self) -> RangeInclusive<usize> {
		match self {
			Horizon::StudyMonth => 1..=4,
			Horizon::StudyDay | Horizon::StudyWeek => 1..=16,
		}
	}
}

impl FromStr for Horizon {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"study_day" => Ok(Horizon::StudyDay),
			"study_week" => Ok(Horizon::StudyWeek),
			"study_month" => Ok(Horizon::StudyMonth),
			_ => Err(Error::UnknownHorizon(s.to_owned())),
		}
	}
}

impl std::fmt::Display for Horizon {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.column_name())
	}
}

/// A named table of observations with its id, target and nominal columns.
#[derive(Debug, Clone)]
pub struct FeatureSet {
	pub name: String,
	pub dataframe: DataFrame,
	/// The grouping key, for example a participant id. It is used for grouped splitting and never enters the model.
	pub id_column: String,
	/// A column of 0 and 1 labels.
	pub target_column: String,
	pub nominal_columns: Vec<String>,
	pub horizon: Horizon,
	/// The number of lags this feature set was materialized with, if any.
	pub n_lags: Option<usize>,
}

/// The model inputs derived from a feature set.
#[derive(Debug, Clone)]
pub struct Design {
	/// One row per observation, one column per feature. Missing values are NaN.
	pub features: Array2<f64>,
	pub labels: Array1<usize>,
	/// Dense group codes derived from the id column.
	pub groups: Vec<usize>,
	pub feature_names: Vec<String>,
	/// The sorted positions of the nominal features among `feature_names`.
	pub nominal_indices: Vec<usize>,
	pub id_column: String,
}

impl FeatureSet {
	/// Drop the rows in the horizon's ramp-up period.
	pub fn exclude_ramp_up(&self) -> Result<FeatureSet, Error> {
		let horizon_column = self.horizon.column_name();
		let horizon = self
			.dataframe
			.column(horizon_column)
			.and_then(|column| column.to_f64())
			.ok_or_else(|| Error::UnknownColumn(horizon_column.to_owned()))?;
		let threshold = self.horizon.ramp_up();
		let rows: Vec<usize> = horizon
			.iter()
			.enumerate()
			.filter(|(_, value)| **value > threshold)
			.map(|(row, _)| row)
			.collect();
		Ok(FeatureSet {
			dataframe: self.dataframe.take(&rows),
			..self.clone()
		})
	}

	/// Materialize the feature set with `n_lags` lagged copies of every observation column. Lagged copies of nominal columns stay nominal.
	pub fn lagged(&self, n_lags: usize) -> Result<FeatureSet, Error> {
		let dataframe = lag(
			&self.dataframe,
			&self.id_column,
			self.horizon.column_name(),
			&self.target_column,
			n_lags,
		)?;
		let nominal_columns = (1..=n_lags)
			.flat_map(|lag| {
				self.nominal_columns
					.iter()
					.map(move |column| lagged_name(column, lag))
			})
			.filter(|column| dataframe.column(column).is_some())
			.collect();
		Ok(FeatureSet {
			name: self.name.clone(),
			dataframe,
			id_column: self.id_column.clone(),
			target_column: self.target_column.clone(),
			nominal_columns,
			horizon: self.horizon,
			n_lags: Some(n_lags),
		})
	}

	/// Split the table into the feature matrix, labels and groups. Every column except the id and target columns is a feature.
	pub fn design(&self) -> Result<Design, Error> {
		let ids = self
			.dataframe
			.column(&self.id_column)
			.ok_or_else(|| Error::UnknownColumn(self.id_column.clone()))?;
		let target = self
			.dataframe
			.column(&self.target_column)
			.and_then(|column| column.to_f64())
			.ok_or_else(|| Error::UnknownColumn(self.target_column.clone()))?;
		let labels = target
			.iter()
			.map(|value| match *value {
				v if v == 0.0 => Ok(0),
				v if v == 1.0 => Ok(1),
				_ => Err(Error::InvalidTarget(self.target_column.clone())),
			})
			.collect::<Result<Array1<usize>, Error>>()?;
		let feature_names: Vec<String> = self
			.dataframe
			.column_names()
			.filter(|name| *name != self.id_column && *name != self.target_column)
			.map(|name| name.to_owned())
			.collect();
		let feature_name_refs: Vec<&str> = feature_names.iter().map(|name| name.as_str()).collect();
		let features = self
			.dataframe
			.to_rows_f64(&feature_name_refs)
			.ok_or_else(|| {
				let text_column = feature_names
					.iter()
					.find(|name| {
						self.dataframe
							.column(name)
							.and_then(|column| column.to_f64())
							.is_none()
					})
					.cloned()
					.unwrap_or_default();
				Error::UnknownColumn(text_column)
			})?;
		let nominal_indices = feature_names
			.iter()
			.enumerate()
			.filter(|(_, name)| self.nominal_columns.contains(name))
			.map(|(index, _)| index)
			.collect();
		Ok(Design {
			features,
			labels,
			groups: ids.codes(),
			feature_names,
			nominal_indices,
			id_column: self.id_column.clone(),
		})
	}
}

#[cfg(test)]
fn feature_set() -> FeatureSet {
	use lagsweep_dataframe::{Column, NumberColumn, TextColumn};
	let ids = ["a", "a", "a", "b", "b", "b"];
	FeatureSet {
		name: "mems".to_owned(),
		dataframe: DataFrame {
			columns: vec![
				Column::Text(TextColumn {
					name: "id".to_owned(),
					data: ids.iter().map(|id| id.to_string()).collect(),
				}),
				Column::Number(NumberColumn {
					name: "study_week".to_owned(),
					data: vec![3.0, 4.0, 5.0, 5.0, 6.0, 7.0],
				}),
				Column::Number(NumberColumn {
					name: "site".to_owned(),
					data: vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0],
				}),
				Column::Number(NumberColumn {
					name: "steps".to_owned(),
					data: vec![10.0, f64::NAN, 30.0, 40.0, 50.0, 60.0],
				}),
				Column::Number(NumberColumn {
					name: "adherent".to_owned(),
					data: vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0],
				}),
			],
		},
		id_column: "id".to_owned(),
		target_column: "adherent".to_owned(),
		nominal_columns: vec!["site".to_owned()],
		horizon: Horizon::StudyWeek,
		n_lags: None,
	}
}

#[test]
fn test_horizon() {
	assert_eq!("study_month".parse::<Horizon>().unwrap(), Horizon::StudyMonth);
	assert_eq!(Horizon::StudyMonth.lag_range(), 1..=4);
	assert_eq!(Horizon::StudyDay.lag_range(), 1..=16);
	assert!(matches!(
		"study_year".parse::<Horizon>(),
		Err(Error::UnknownHorizon(_))
	));
}

#[test]
fn test_design_excludes_id_and_target() {
	let design = feature_set().design().unwrap();
	assert_eq!(design.feature_names, vec!["study_week", "site", "steps"]);
	assert_eq!(design.nominal_indices, vec![1]);
	assert_eq!(design.labels, array![0, 1, 1, 0, 0, 1]);
	assert_eq!(design.groups, vec![0, 0, 0, 1, 1, 1]);
	assert!(design.features[[1, 2]].is_nan());
}

#[test]
fn test_exclude_ramp_up() {
	let feature_set = feature_set().exclude_ramp_up().unwrap();
	assert_eq!(feature_set.dataframe.nrows(), 4);
}

#[test]
fn test_lagged_keeps_nominal_columns() {
	let lagged = feature_set().lagged(1).unwrap();
	assert_eq!(lagged.n_lags, Some(1));
	assert_eq!(lagged.nominal_columns, vec!["site_lag1"]);
	let design = lagged.design().unwrap();
	assert_eq!(
		design.feature_names,
		vec!["study_week", "site_lag1", "steps_lag1", "adherent_lag1"]
	);
	assert_eq!(design.nominal_indices, vec![1]);
	assert_eq!(design.features.nrows(), 4);
}
