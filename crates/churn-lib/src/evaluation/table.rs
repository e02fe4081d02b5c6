//! Evaluation table model and CSV codec

use crate::error::{EvaluationError, PipelineError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Class label of the churn (positive) outcome
pub const POSITIVE_CLASS: u32 = 1;

/// Class label of the retained (negative) outcome
pub const NEGATIVE_CLASS: u32 = 0;

/// One row of an evaluation table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    #[serde(rename = "Class")]
    pub class_label: u32,
    #[serde(rename = "Precision")]
    pub precision: f64,
    #[serde(rename = "Recall")]
    pub recall: f64,
    #[serde(rename = "F1-Score")]
    pub f1_score: f64,
    #[serde(rename = "Support")]
    pub support: u64,
    /// Overall accuracy, repeated on every row
    #[serde(rename = "Accuracy")]
    pub accuracy: f64,
    pub algorithm: String,
    pub timestamp: String,
}

/// Per-class metrics for one trained model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTable {
    records: Vec<EvaluationRecord>,
}

impl EvaluationTable {
    /// Build a table, rejecting repeated class labels
    pub fn new(records: Vec<EvaluationRecord>) -> Result<Self, EvaluationError> {
        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.class_label) {
                return Err(EvaluationError::DuplicateClass(record.class_label));
            }
        }
        Ok(Self { records })
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, EvaluationError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes);
        let records = reader
            .deserialize()
            .collect::<Result<Vec<EvaluationRecord>, _>>()?;
        Self::new(records)
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, EvaluationError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer
            .into_inner()
            .map_err(|e| EvaluationError::Csv(e.into_error().into()))
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_for(&self, class_label: u32) -> Option<&EvaluationRecord> {
        self.records.iter().find(|r| r.class_label == class_label)
    }

    pub fn positive_class(&self) -> Result<&EvaluationRecord, EvaluationError> {
        self.record_for(POSITIVE_CLASS)
            .ok_or(EvaluationError::MissingClass(POSITIVE_CLASS))
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.records.first().map(|r| r.accuracy)
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.records.first().map(|r| r.algorithm.as_str())
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.records.first().map(|r| r.timestamp.as_str())
    }
}

/// Metric compared between staged and production models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Accuracy,
    #[serde(rename = "F1-Score")]
    F1Score,
    Precision,
    Recall,
}

impl Metric {
    /// Checked in this order unless configured otherwise
    pub const DEFAULT_COMPARISON: [Metric; 2] = [Metric::Accuracy, Metric::F1Score];

    /// Column header used in evaluation tables
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Accuracy => "Accuracy",
            Metric::F1Score => "F1-Score",
            Metric::Precision => "Precision",
            Metric::Recall => "Recall",
        }
    }

    pub fn value(&self, record: &EvaluationRecord) -> f64 {
        match self {
            Metric::Accuracy => record.accuracy,
            Metric::F1Score => record.f1_score,
            Metric::Precision => record.precision,
            Metric::Recall => record.recall,
        }
    }

    /// Parse a comma-separated metric list such as `Accuracy,F1-Score`
    pub fn parse_list(list: &str) -> Result<Vec<Metric>, PipelineError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "accuracy" => Ok(Metric::Accuracy),
            "f1score" | "f1" => Ok(Metric::F1Score),
            "precision" => Ok(Metric::Precision),
            "recall" => Ok(Metric::Recall),
            _ => Err(PipelineError::UnknownMetric(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANDAS_CSV: &str = "\
Class,Precision,Recall,F1-Score,Support,Accuracy,algorithm,timestamp
0,0.91,0.88,0.8947,1200,0.87,logistic_regression,20250101120000
1,0.82,0.86,0.8395,800,0.87,logistic_regression,20250101120000
";

    #[test]
    fn test_parses_pandas_output() {
        let table = EvaluationTable::from_csv(PANDAS_CSV.as_bytes()).unwrap();
        assert_eq!(table.records().len(), 2);

        let positive = table.positive_class().unwrap();
        assert_eq!(positive.support, 800);
        assert_eq!(positive.f1_score, 0.8395);
        assert_eq!(table.accuracy(), Some(0.87));
        assert_eq!(table.algorithm(), Some("logistic_regression"));
        assert_eq!(table.timestamp(), Some("20250101120000"));
    }

    #[test]
    fn test_csv_header_is_stable() {
        let table = EvaluationTable::from_csv(PANDAS_CSV.as_bytes()).unwrap();
        let bytes = table.to_csv().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "Class,Precision,Recall,F1-Score,Support,Accuracy,algorithm,timestamp"
        );
        assert_eq!(EvaluationTable::from_csv(text.as_bytes()).unwrap(), table);
    }

    #[test]
    fn test_rejects_duplicate_class() {
        let csv = format!("{PANDAS_CSV}1,0.5,0.5,0.5,10,0.87,logistic_regression,20250101120000\n");
        let err = EvaluationTable::from_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, EvaluationError::DuplicateClass(1)));
    }

    #[test]
    fn test_missing_positive_class() {
        let csv = "Class,Precision,Recall,F1-Score,Support,Accuracy,algorithm,timestamp\n\
                   0,0.9,0.9,0.9,10,0.9,lr,1\n";
        let table = EvaluationTable::from_csv(csv.as_bytes()).unwrap();
        assert!(matches!(
            table.positive_class(),
            Err(EvaluationError::MissingClass(1))
        ));
    }

    #[test]
    fn test_rejects_non_numeric_metric() {
        let csv = "Class,Precision,Recall,F1-Score,Support,Accuracy,algorithm,timestamp\n\
                   1,high,0.9,0.9,10,0.9,lr,1\n";
        assert!(matches!(
            EvaluationTable::from_csv(csv.as_bytes()),
            Err(EvaluationError::Csv(_))
        ));
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("Accuracy".parse::<Metric>().unwrap(), Metric::Accuracy);
        assert_eq!("F1-Score".parse::<Metric>().unwrap(), Metric::F1Score);
        assert_eq!("f1_score".parse::<Metric>().unwrap(), Metric::F1Score);
        assert!("roc_auc".parse::<Metric>().is_err());

        let list = Metric::parse_list("Accuracy, F1-Score,").unwrap();
        assert_eq!(list, Metric::DEFAULT_COMPARISON.to_vec());
    }
}
