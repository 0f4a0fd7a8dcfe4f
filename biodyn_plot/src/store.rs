use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde_json::{Map, Value};
use tracing::debug;

use crate::channels::TimeSeries;
use crate::PlotError;

const TIME_KEY: &str = "time";

/// Persisted simulation results: case id -> named entries, in file order.
#[derive(Clone, Debug)]
pub struct ResultsStore {
    path: PathBuf,
    cases: Vec<(String, CaseResults)>,
}

impl ResultsStore {
    pub fn load(path: &Path) -> Result<Self, PlotError> {
        let text = fs::read_to_string(path).map_err(|source| PlotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| PlotError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_value(path, value)?;
        debug!("Loaded {} case(s) from {}", store.cases.len(), path.display());
        Ok(store)
    }

    /// Build a store from an already parsed document. `path` is only used
    /// for error messages and to derive default output locations.
    pub fn from_value(path: &Path, value: Value) -> Result<Self, PlotError> {
        let Value::Object(top) = value else {
            return Err(PlotError::InvalidArray {
                key: "<root>".into(),
                reason: "expected an object keyed by case id".into(),
            });
        };
        let mut cases = Vec::with_capacity(top.len());
        for (case_id, entry) in top {
            match entry {
                Value::Object(entries) => cases.push((case_id, CaseResults::new(entries))),
                other => {
                    return Err(PlotError::InvalidArray {
                        key: case_id,
                        reason: format!("case entry is {}, expected an object", json_kind(&other)),
                    })
                }
            }
        }
        if cases.is_empty() {
            return Err(PlotError::EmptyStore(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            cases,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn cases(&self) -> impl Iterator<Item = (&str, &CaseResults)> {
        self.cases.iter().map(|(id, case)| (id.as_str(), case))
    }

    /// First case in file order. Stores always hold at least one case.
    pub fn first_case(&self) -> (&str, &CaseResults) {
        let (id, case) = &self.cases[0];
        (id.as_str(), case)
    }
}

/// Entries of a single case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaseResults {
    entries: Map<String, Value>,
}

impl CaseResults {
    pub fn new(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Numeric entry as a channels-by-samples table. A flat list is one row;
    /// `null` elements become NaN.
    pub fn matrix(&self, key: &str) -> Result<Option<Array2<f64>>, PlotError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => parse_matrix(key, value).map(Some),
        }
    }

    pub fn labels(&self, key: &str) -> Result<Option<Vec<String>>, PlotError> {
        let Some(value) = self.entries.get(key) else {
            return Ok(None);
        };
        let invalid = || PlotError::InvalidLabels {
            key: key.to_string(),
        };
        let Value::Array(items) = value else {
            return Err(invalid());
        };
        items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Plot time axis: the stored `time` row (first row of a 2-D entry)
    /// minus its final sample.
    pub fn time(&self) -> Result<TimeSeries, PlotError> {
        let stored = self.matrix(TIME_KEY)?.ok_or(PlotError::MissingTime)?;
        if stored.nrows() == 0 {
            return Err(PlotError::MissingTime);
        }
        TimeSeries::from_stored_row(stored.row(0))
    }

    /// Shape summary used by the inspection report.
    pub fn entry_kind(&self, key: &str) -> Option<EntryKind> {
        self.entries.get(key).map(|value| classify(key, value))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntryKind {
    Matrix { rows: usize, cols: usize, nan: usize },
    Labels(usize),
    Scalar(f64),
    Text(String),
    Other(&'static str),
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Matrix { rows, cols, nan } => {
                write!(f, "matrix {}x{}", rows, cols)?;
                if *nan > 0 {
                    write!(f, " ({} NaN)", nan)?;
                }
                Ok(())
            }
            EntryKind::Labels(n) => write!(f, "labels [{}]", n),
            EntryKind::Scalar(v) => write!(f, "scalar {}", v),
            EntryKind::Text(s) => write!(f, "text {:?}", s),
            EntryKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

fn classify(key: &str, value: &Value) -> EntryKind {
    match value {
        Value::Number(n) => EntryKind::Scalar(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => EntryKind::Text(s.clone()),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => {
            EntryKind::Labels(items.len())
        }
        Value::Array(_) => match parse_matrix(key, value) {
            Ok(m) => EntryKind::Matrix {
                rows: m.nrows(),
                cols: m.ncols(),
                nan: m.iter().filter(|v| v.is_nan()).count(),
            },
            Err(_) => EntryKind::Other("mixed list"),
        },
        other => EntryKind::Other(json_kind(other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn parse_matrix(key: &str, value: &Value) -> Result<Array2<f64>, PlotError> {
    let invalid = |reason: String| PlotError::InvalidArray {
        key: key.to_string(),
        reason,
    };
    let Value::Array(items) = value else {
        return Err(invalid(format!("found {}", json_kind(value))));
    };
    if items.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }

    if items.iter().all(Value::is_array) {
        let mut cols = None;
        let mut flat = Vec::new();
        for (r, row) in items.iter().enumerate() {
            let row = row.as_array().map(Vec::as_slice).unwrap_or_default();
            match cols {
                None => cols = Some(row.len()),
                Some(c) if c != row.len() => {
                    return Err(invalid(format!(
                        "row {} has {} samples, row 0 has {}",
                        r,
                        row.len(),
                        c
                    )))
                }
                Some(_) => {}
            }
            for (c, cell) in row.iter().enumerate() {
                flat.push(number(cell).ok_or_else(|| invalid(format!("element [{}, {}] is not a number", r, c)))?);
            }
        }
        let shape = (items.len(), cols.unwrap_or(0));
        return Array2::from_shape_vec(shape, flat).map_err(|err| invalid(err.to_string()));
    }

    let row = items
        .iter()
        .enumerate()
        .map(|(i, cell)| number(cell).ok_or_else(|| invalid(format!("element {} is not a number", i))))
        .collect::<Result<Vec<_>, _>>()?;
    let cols = row.len();
    Array2::from_shape_vec((1, cols), row).map_err(|err| invalid(err.to_string()))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(f64::NAN),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(value: Value) -> CaseResults {
        match value {
            Value::Object(map) => CaseResults::new(map),
            _ => panic!("test case must be an object"),
        }
    }

    #[test]
    fn nested_lists_become_rows() {
        let c = case(json!({"GRF": [[1.0, 2.0, null], [4.0, 5.0, 6.0]]}));
        let m = c.matrix("GRF").unwrap().unwrap();
        assert_eq!(m.dim(), (2, 3));
        assert_eq!(m[[1, 2]], 6.0);
        assert!(m[[0, 2]].is_nan());
        assert!(c.matrix("GRM").unwrap().is_none());
    }

    #[test]
    fn flat_list_is_one_row() {
        let c = case(json!({"KAM": [0.5, 1.5]}));
        assert_eq!(c.matrix("KAM").unwrap().unwrap().dim(), (1, 2));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let c = case(json!({"COP": [[1.0, 2.0], [3.0]]}));
        assert!(matches!(c.matrix("COP"), Err(PlotError::InvalidArray { .. })));
        let c = case(json!({"COP": [[1.0, "x"]]}));
        assert!(matches!(c.matrix("COP"), Err(PlotError::InvalidArray { .. })));
    }

    #[test]
    fn labels_must_be_strings() {
        let c = case(json!({"muscles": ["soleus_r", "gasmed_r"], "bad": [1, 2]}));
        assert_eq!(c.labels("muscles").unwrap().unwrap(), vec!["soleus_r", "gasmed_r"]);
        assert!(c.labels("coordinates").unwrap().is_none());
        assert!(matches!(c.labels("bad"), Err(PlotError::InvalidLabels { .. })));
    }

    #[test]
    fn time_drops_final_sample() {
        let c = case(json!({"time": [[0.0, 0.01, 0.02, 0.03]]}));
        let t = c.time().unwrap();
        assert_eq!(t.as_slice(), &[0.0, 0.01, 0.02]);

        let flat = case(json!({"time": [0.0, 0.5, 1.0]}));
        assert_eq!(flat.time().unwrap().len(), 2);

        assert!(matches!(case(json!({})).time(), Err(PlotError::MissingTime)));
    }

    #[test]
    fn first_case_follows_file_order() {
        let doc = json!({"trial_b": {"time": [0.0, 1.0]}, "trial_a": {}});
        let store = ResultsStore::from_value(Path::new("results.json"), doc).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.first_case().0, "trial_b");
    }

    #[test]
    fn empty_or_malformed_documents_fail() {
        let err = ResultsStore::from_value(Path::new("r.json"), json!({})).unwrap_err();
        assert!(matches!(err, PlotError::EmptyStore(_)));
        let err = ResultsStore::from_value(Path::new("r.json"), json!({"c": [1, 2]})).unwrap_err();
        assert!(matches!(err, PlotError::InvalidArray { .. }));
    }

    #[test]
    fn load_reports_io_and_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(ResultsStore::load(&missing), Err(PlotError::Io { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(ResultsStore::load(&broken), Err(PlotError::Json { .. })));
    }

    #[test]
    fn entry_kinds_summarize_shapes() {
        let c = case(json!({
            "GRF": [[1.0, null], [2.0, 3.0]],
            "GRF_labels": ["a", "b"],
            "mass": 72.5,
            "flag": true
        }));
        assert_eq!(
            c.entry_kind("GRF"),
            Some(EntryKind::Matrix { rows: 2, cols: 2, nan: 1 })
        );
        assert_eq!(c.entry_kind("GRF_labels"), Some(EntryKind::Labels(2)));
        assert_eq!(c.entry_kind("mass"), Some(EntryKind::Scalar(72.5)));
        assert_eq!(c.entry_kind("flag"), Some(EntryKind::Other("bool")));
        assert_eq!(
            EntryKind::Matrix { rows: 2, cols: 2, nan: 1 }.to_string(),
            "matrix 2x2 (1 NaN)"
        );
    }
}
