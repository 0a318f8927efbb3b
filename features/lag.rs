/*!
Lagging turns a long table of observations, one row per group and time step, into a table where each row carries the previous `n_lags` observations of its group as features.

For every row the output keeps the id, horizon and target columns at the current time step. Every other column, the target included, is replaced by `n_lags` lagged copies named with [`lagged_name`]. Rows are ordered by group, in order of first appearance, then by horizon. A row whose group has fewer than `n_lags` earlier rows has no full history and is dropped.
*/

use lagsweep_dataframe::{Column, DataFrame};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LagError {
	#[error("the column \"{0}\" does not exist")]
	UnknownColumn(String),
	#[error("the horizon column \"{0}\" is not numeric")]
	NonNumericHorizon(String),
}

/// The name of the column holding `column` lagged by `lag` time steps.
pub fn lagged_name(column: &str, lag: usize) -> String {
	format!("{}_lag{}", column, lag)
}

pub fn lag(
	dataframe: &DataFrame,
	id_column: &str,
	horizon_column: &str,
	target_column: &str,
	n_lags: usize,
) -> Result<DataFrame, LagError> {
	let column = |name: &str| {
		dataframe
			.column(name)
			.ok_or_else(|| LagError::UnknownColumn(name.to_owned()))
	};
	let ids = column(id_column)?;
	let horizon = column(horizon_column)?
		.to_f64()
		.ok_or_else(|| LagError::NonNumericHorizon(horizon_column.to_owned()))?;
	let target = column(target_column)?;

	// Sort the rows of each group by horizon.
	let codes = ids.codes();
	let n_groups = codes.iter().max().map(|max| max + 1).unwrap_or(0);
	let mut rows_by_group: Vec<Vec<usize>> = vec![Vec::new(); n_groups];
	for (row, code) in codes.iter().enumerate() {
		rows_by_group[*code].push(row);
	}
	let mut current_rows = Vec::new();
	let mut lag_rows: Vec<Vec<usize>> = vec![Vec::new(); n_lags];
	for rows in rows_by_group.iter_mut() {
		rows.sort_by(|a, b| horizon[*a].total_cmp(&horizon[*b]));
		for position in n_lags..rows.len() {
			current_rows.push(rows[position]);
			for (lag_index, lag_rows) in lag_rows.iter_mut().enumerate() {
				lag_rows.push(rows[position - lag_index - 1]);
			}
		}
	}

	let mut columns = vec![
		ids.take(&current_rows),
		column(horizon_column)?.take(&current_rows),
		target.take(&current_rows),
	];
	let lagged_columns: Vec<&Column> = dataframe
		.columns
		.iter()
		.filter(|column| column.name() != id_column && column.name() != horizon_column)
		.collect();
	for (lag_index, lag_rows) in lag_rows.iter().enumerate() {
		for source in lagged_columns.iter() {
			let mut lagged = source.take(lag_rows);
			lagged.set_name(lagged_name(source.name(), lag_index + 1));
			columns.push(lagged);
		}
	}
	Ok(DataFrame { columns })
}

#[cfg(test)]
fn long_table() -> DataFrame {
	use lagsweep_dataframe::{NumberColumn, TextColumn};
	DataFrame {
		columns: vec![
			Column::Text(TextColumn {
				name: "id".to_owned(),
				data: ["a", "a", "b", "a", "b", "b"]
					.iter()
					.map(|id| id.to_string())
					.collect(),
			}),
			Column::Number(NumberColumn {
				name: "study_day".to_owned(),
				data: vec![3.0, 1.0, 1.0, 2.0, 2.0, 3.0],
			}),
			Column::Number(NumberColumn {
				name: "mood".to_owned(),
				data: vec![30.0, 10.0, 100.0, 20.0, 200.0, 300.0],
			}),
			Column::Number(NumberColumn {
				name: "adherent".to_owned(),
				data: vec![1.0, 0.0, 1.0, 1.0, 0.0, 0.0],
			}),
		],
	}
}

#[test]
fn test_lag() {
	let lagged = lag(&long_table(), "id", "study_day", "adherent", 2).unwrap();
	assert_eq!(
		lagged.column_names().collect::<Vec<_>>(),
		vec![
			"id",
			"study_day",
			"adherent",
			"mood_lag1",
			"adherent_lag1",
			"mood_lag2",
			"adherent_lag2"
		]
	);
	// Each group has three days so only the third day of each has a full history.
	assert_eq!(lagged.nrows(), 2);
	let number = |name: &str| lagged.column(name).unwrap().as_number().unwrap().data.clone();
	assert_eq!(number("study_day"), vec![3.0, 3.0]);
	assert_eq!(number("adherent"), vec![1.0, 0.0]);
	assert_eq!(number("mood_lag1"), vec![20.0, 200.0]);
	assert_eq!(number("mood_lag2"), vec![10.0, 100.0]);
	assert_eq!(number("adherent_lag1"), vec![1.0, 0.0]);
}

#[test]
fn test_lag_unknown_column() {
	assert_eq!(
		lag(&long_table(), "subject", "study_day", "adherent", 1).unwrap_err(),
		LagError::UnknownColumn("subject".to_owned())
	);
}
