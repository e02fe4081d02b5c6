//! Cleaning, feature engineering, scaling and encoding of customer data
//!
//! `Fit` mode learns a scaler and encoder from the training data. `Inference`
//! mode reuses previously fitted ones and never refits: records with missing
//! values or unseen categories are rejected instead.

use super::dataset::{Cell, Dataset};
use crate::error::{PipelineError, PipelineResult};
use crate::naming::join;
use crate::store::{replace, ArtifactStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const TARGET_COLUMN: &str = "Churn";
pub const ID_COLUMN: &str = "CustomerID";
pub const RECENTLY_ACTIVE: &str = "RecentlyActive";
pub const HIGH_SUPPORT_USER: &str = "HighSupportUser";
const LAST_INTERACTION: &str = "Last Interaction";
const SUPPORT_CALLS: &str = "Support Calls";

/// Customers who interacted within this many days count as recently active
const RECENT_INTERACTION_DAYS: f64 = 5.0;
/// Customers with more support calls than this are high-support users
const HIGH_SUPPORT_CALLS: f64 = 5.0;

pub const PROCESSED_DATA_FILE: &str = "processed_data.csv";
pub const SCALER_FILE: &str = "scaler.json";
pub const ENCODER_FILE: &str = "encoder.json";

/// Columns left unscaled even though they are numeric
const UNSCALED: [&str; 3] = [TARGET_COLUMN, RECENTLY_ACTIVE, HIGH_SUPPORT_USER];

fn numbers(dataset: &Dataset, index: usize) -> PipelineResult<Vec<f64>> {
    dataset
        .column(index)
        .map(|cell| {
            cell.as_number().ok_or_else(|| {
                PipelineError::InvalidData(format!(
                    "column {:?} expects numbers, found {:?}",
                    dataset.columns()[index],
                    cell.render()
                ))
            })
        })
        .collect()
}

/// Per-column standardization to zero mean and unit variance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    means: Vec<f64>,
    /// Population standard deviation; 1.0 for constant columns
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(dataset: &Dataset, columns: &[String]) -> PipelineResult<Self> {
        let mut means = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());
        for column in columns {
            let values = numbers(dataset, dataset.require_column(column)?)?;
            if values.is_empty() {
                return Err(PipelineError::EmptyDataset);
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std > 0.0 { std } else { 1.0 });
        }
        Ok(Self {
            columns: columns.to_vec(),
            means,
            scales,
        })
    }

    pub fn transform(&self, dataset: &mut Dataset) -> PipelineResult<()> {
        for (i, column) in self.columns.iter().enumerate() {
            let index = dataset.require_column(column)?;
            let (mean, scale) = (self.means[i], self.scales[i]);
            dataset.map_column(index, |cell| match cell {
                Cell::Number(value) => Ok(Cell::Number((value - mean) / scale)),
                other => Err(PipelineError::InvalidData(format!(
                    "column {column:?} expects numbers, found {:?}",
                    other.render()
                ))),
            })?;
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Maps each category of a text column to its index in the sorted class list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: BTreeMap<String, Vec<String>>,
}

impl LabelEncoder {
    pub fn fit(dataset: &Dataset, columns: &[String]) -> PipelineResult<Self> {
        let mut classes = BTreeMap::new();
        for column in columns {
            let index = dataset.require_column(column)?;
            let mut values: Vec<String> = dataset.column(index).map(Cell::render).collect();
            values.sort();
            values.dedup();
            classes.insert(column.clone(), values);
        }
        Ok(Self { classes })
    }

    pub fn transform(&self, dataset: &mut Dataset) -> PipelineResult<()> {
        self.transform_except(dataset, None)
    }

    /// Encode every fitted column except the target, which scored records do not carry
    pub fn transform_features(&self, dataset: &mut Dataset) -> PipelineResult<()> {
        self.transform_except(dataset, Some(TARGET_COLUMN))
    }

    fn transform_except(&self, dataset: &mut Dataset, skip: Option<&str>) -> PipelineResult<()> {
        for (column, classes) in &self.classes {
            if skip == Some(column.as_str()) {
                continue;
            }
            let index = dataset.require_column(column)?;
            dataset.map_column(index, |cell| {
                let value = cell.render();
                classes
                    .binary_search(&value)
                    .map(|code| Cell::Number(code as f64))
                    .map_err(|_| {
                        PipelineError::InvalidData(format!(
                            "unseen category {value:?} in column {column:?}"
                        ))
                    })
            })?;
        }
        Ok(())
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> + '_ {
        self.classes.keys()
    }

    pub fn classes(&self, column: &str) -> Option<&[String]> {
        self.classes.get(column).map(Vec::as_slice)
    }
}

/// Scaler and encoder learned from one training run
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTransforms {
    pub scaler: StandardScaler,
    pub encoder: LabelEncoder,
}

#[derive(Debug, Clone, Copy)]
pub enum PreprocessMode<'a> {
    Fit,
    Inference(&'a FittedTransforms),
}

/// Output of [`preprocess`]: an all-numeric dataset
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub dataset: Dataset,
    pub transforms: FittedTransforms,
    pub messages: Vec<String>,
}

/// Clean, engineer, scale and encode `dataset`
pub fn preprocess(mut dataset: Dataset, mode: PreprocessMode<'_>) -> PipelineResult<Preprocessed> {
    if dataset.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }
    let mut messages = vec![format!("Input records: {}", dataset.len())];

    match mode {
        PreprocessMode::Fit => {
            dataset.drop_missing();
            messages.push(format!(
                "Dropped missing values. Remaining records: {}",
                dataset.len()
            ));
            dataset.drop_duplicates();
            messages.push(format!(
                "Dropped duplicate records. Remaining records: {}",
                dataset.len()
            ));
            if !dataset.drop_column(ID_COLUMN) {
                return Err(PipelineError::MissingColumn(ID_COLUMN.to_string()));
            }
            messages.push(format!("Dropped {ID_COLUMN} column."));
            if dataset.is_empty() {
                return Err(PipelineError::EmptyDataset);
            }
            dataset.require_column(TARGET_COLUMN)?;
        }
        PreprocessMode::Inference(_) => {
            dataset.drop_column(ID_COLUMN);
            for (row_index, row) in dataset.rows().iter().enumerate() {
                if let Some(col) = row.iter().position(Cell::is_missing) {
                    return Err(PipelineError::InvalidData(format!(
                        "record {row_index} has no value for {:?}",
                        dataset.columns()[col]
                    )));
                }
            }
        }
    }

    add_engineered_features(&mut dataset)?;

    let transforms = match mode {
        PreprocessMode::Fit => {
            let (numeric, categorical) = split_columns(&dataset);
            FittedTransforms {
                scaler: StandardScaler::fit(&dataset, &numeric)?,
                encoder: LabelEncoder::fit(&dataset, &categorical)?,
            }
        }
        PreprocessMode::Inference(fitted) => fitted.clone(),
    };

    transforms.scaler.transform(&mut dataset)?;
    messages.push(format!(
        "Normalized numerical columns: {}",
        transforms.scaler.columns().join(", ")
    ));
    match mode {
        PreprocessMode::Fit => transforms.encoder.transform(&mut dataset)?,
        PreprocessMode::Inference(_) => transforms.encoder.transform_features(&mut dataset)?,
    }
    messages.push(format!(
        "Encoded categorical columns: {}",
        transforms.encoder.columns().cloned().collect::<Vec<_>>().join(", ")
    ));

    debug!(records = dataset.len(), columns = dataset.columns().len(), "Preprocessing complete");
    Ok(Preprocessed {
        dataset,
        transforms,
        messages,
    })
}

fn add_engineered_features(dataset: &mut Dataset) -> PipelineResult<()> {
    let last_interaction = numbers(dataset, dataset.require_column(LAST_INTERACTION)?)?;
    let support_calls = numbers(dataset, dataset.require_column(SUPPORT_CALLS)?)?;
    let flag = |set: bool| Cell::Number(if set { 1.0 } else { 0.0 });

    dataset.push_column(
        RECENTLY_ACTIVE,
        last_interaction
            .iter()
            .map(|days| flag(*days < RECENT_INTERACTION_DAYS))
            .collect(),
    )?;
    dataset.push_column(
        HIGH_SUPPORT_USER,
        support_calls
            .iter()
            .map(|calls| flag(*calls > HIGH_SUPPORT_CALLS))
            .collect(),
    )
}

/// Numeric columns to scale and text columns to encode
fn split_columns(dataset: &Dataset) -> (Vec<String>, Vec<String>) {
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();
    for (index, column) in dataset.columns().iter().enumerate() {
        let all_numbers = dataset.column(index).all(|c| c.as_number().is_some());
        if !all_numbers {
            categorical.push(column.clone());
        } else if !UNSCALED.contains(&column.as_str()) {
            numeric.push(column.clone());
        }
    }
    (numeric, categorical)
}

fn encode<T: Serialize>(what: &'static str, value: &T) -> PipelineResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|source| PipelineError::Serialization { what, source })
}

fn decode<'a, T: Deserialize<'a>>(what: &'static str, bytes: &'a [u8]) -> PipelineResult<T> {
    serde_json::from_slice(bytes).map_err(|source| PipelineError::Serialization { what, source })
}

/// Store the scaler and encoder under `prefix`, replacing older copies
pub async fn save_transforms(
    store: &dyn ArtifactStore,
    prefix: &str,
    transforms: &FittedTransforms,
) -> PipelineResult<Vec<String>> {
    let scaler_name = join(prefix, SCALER_FILE);
    replace(store, &scaler_name, &encode("scaler", &transforms.scaler)?).await?;
    let encoder_name = join(prefix, ENCODER_FILE);
    replace(store, &encoder_name, &encode("encoder", &transforms.encoder)?).await?;

    info!(scaler = %scaler_name, encoder = %encoder_name, "Saved fitted transforms");
    Ok(vec![scaler_name, encoder_name])
}

/// Load the scaler and encoder saved by the last training run
pub async fn load_transforms(store: &dyn ArtifactStore, prefix: &str) -> PipelineResult<FittedTransforms> {
    let scaler = store.read(&join(prefix, SCALER_FILE)).await?;
    let encoder = store.read(&join(prefix, ENCODER_FILE)).await?;
    Ok(FittedTransforms {
        scaler: decode("scaler", &scaler)?,
        encoder: decode("encoder", &encoder)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryArtifactStore;

    const RAW: &str = "\
CustomerID,Age,Gender,Support Calls,Last Interaction,Subscription Type,Churn
1,30,Female,2,3,Basic,0
2,40,Male,8,10,Premium,1
2,40,Male,8,10,Premium,1
3,,Male,1,1,Basic,0
4,50,Female,6,4,Standard,1
";

    fn raw() -> Dataset {
        Dataset::from_csv("raw.csv", RAW.as_bytes()).unwrap()
    }

    fn value(dataset: &Dataset, row: usize, column: &str) -> f64 {
        dataset.rows()[row][dataset.column_index(column).unwrap()]
            .as_number()
            .unwrap()
    }

    #[test]
    fn test_fit_cleans_and_encodes() {
        let out = preprocess(raw(), PreprocessMode::Fit).unwrap();
        let data = &out.dataset;

        // one missing row and one duplicate removed
        assert_eq!(data.len(), 3);
        assert!(data.column_index(ID_COLUMN).is_none());
        assert!(data
            .rows()
            .iter()
            .all(|row| row.iter().all(|c| c.as_number().is_some())));

        assert_eq!(value(data, 0, RECENTLY_ACTIVE), 1.0);
        assert_eq!(value(data, 1, RECENTLY_ACTIVE), 0.0);
        assert_eq!(value(data, 1, HIGH_SUPPORT_USER), 1.0);
        assert_eq!(value(data, 0, HIGH_SUPPORT_USER), 0.0);

        // target and flags are not scaled
        assert_eq!(value(data, 1, TARGET_COLUMN), 1.0);
        assert!(!out
            .transforms
            .scaler
            .columns()
            .iter()
            .any(|c| UNSCALED.contains(&c.as_str())));

        // sorted classes: Female=0, Male=1
        assert_eq!(value(data, 0, "Gender"), 0.0);
        assert_eq!(value(data, 1, "Gender"), 1.0);
        assert_eq!(
            out.transforms.encoder.classes("Subscription Type").unwrap(),
            ["Basic", "Premium", "Standard"]
        );
    }

    #[test]
    fn test_scaled_columns_have_zero_mean() {
        let out = preprocess(raw(), PreprocessMode::Fit).unwrap();
        let index = out.dataset.column_index("Age").unwrap();
        let mean: f64 = out
            .dataset
            .column(index)
            .filter_map(Cell::as_number)
            .sum::<f64>()
            / out.dataset.len() as f64;
        assert!(mean.abs() < 1e-9);
    }

    #[test]
    fn test_constant_column_scales_by_one() {
        let data = Dataset::from_csv("c.csv", b"x\n4\n4\n").unwrap();
        let scaler = StandardScaler::fit(&data, &["x".to_string()]).unwrap();
        let mut transformed = data.clone();
        scaler.transform(&mut transformed).unwrap();
        assert_eq!(transformed.rows()[0][0], Cell::Number(0.0));
    }

    #[test]
    fn test_fit_requires_customer_id() {
        let mut data = raw();
        data.drop_column(ID_COLUMN);
        let err = preprocess(data, PreprocessMode::Fit).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(c) if c == ID_COLUMN));
    }

    #[test]
    fn test_empty_input_rejected() {
        let data = Dataset::from_csv("e.csv", b"CustomerID,Churn\n").unwrap();
        assert!(matches!(
            preprocess(data, PreprocessMode::Fit),
            Err(PipelineError::EmptyDataset)
        ));
    }

    #[test]
    fn test_inference_reuses_fitted_transforms() {
        let fitted = preprocess(raw(), PreprocessMode::Fit).unwrap().transforms;
        let input = Dataset::from_csv(
            "in.csv",
            b"Age,Gender,Support Calls,Last Interaction,Subscription Type\n40,Male,8,10,Premium\n40,Male,8,10,Premium\n",
        )
        .unwrap();

        let out = preprocess(input, PreprocessMode::Inference(&fitted)).unwrap();

        // duplicates are scored, not dropped
        assert_eq!(out.dataset.len(), 2);
        assert_eq!(out.transforms, fitted);
        assert_eq!(value(&out.dataset, 0, "Gender"), 1.0);
    }

    #[test]
    fn test_inference_skips_text_target() {
        let labelled = RAW.replace(",0\n", ",No\n").replace(",1\n", ",Yes\n");
        let data = Dataset::from_csv("raw.csv", labelled.as_bytes()).unwrap();
        let fitted = preprocess(data, PreprocessMode::Fit).unwrap().transforms;
        assert!(fitted.encoder.classes(TARGET_COLUMN).is_some());

        let input = Dataset::from_csv(
            "in.csv",
            b"Age,Gender,Support Calls,Last Interaction,Subscription Type\n30,Female,2,3,Basic\n",
        )
        .unwrap();
        let out = preprocess(input, PreprocessMode::Inference(&fitted)).unwrap();

        assert_eq!(out.dataset.len(), 1);
        assert!(out.dataset.column_index(TARGET_COLUMN).is_none());
        assert_eq!(value(&out.dataset, 0, "Gender"), 0.0);
    }

    #[test]
    fn test_inference_rejects_unseen_category() {
        let fitted = preprocess(raw(), PreprocessMode::Fit).unwrap().transforms;
        let input = Dataset::from_csv(
            "in.csv",
            b"Age,Gender,Support Calls,Last Interaction,Subscription Type\n40,Male,8,10,Enterprise\n",
        )
        .unwrap();

        let err = preprocess(input, PreprocessMode::Inference(&fitted)).unwrap_err();
        assert!(err.to_string().contains("Enterprise"));
    }

    #[test]
    fn test_inference_rejects_missing_values() {
        let fitted = preprocess(raw(), PreprocessMode::Fit).unwrap().transforms;
        let input = Dataset::from_csv(
            "in.csv",
            b"Age,Gender,Support Calls,Last Interaction,Subscription Type\n,Male,8,10,Basic\n",
        )
        .unwrap();

        let err = preprocess(input, PreprocessMode::Inference(&fitted)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_transforms_persist_and_reload() {
        let store = MemoryArtifactStore::new();
        let fitted = preprocess(raw(), PreprocessMode::Fit).unwrap().transforms;

        let names = save_transforms(&store, "data/processed/", &fitted).await.unwrap();
        assert_eq!(names, ["data/processed/scaler.json", "data/processed/encoder.json"]);

        // a second save replaces the objects
        save_transforms(&store, "data/processed/", &fitted).await.unwrap();
        let loaded = load_transforms(&store, "data/processed/").await.unwrap();
        assert_eq!(loaded, fitted);
    }
}
