//! Prediction command

use crate::client::{ApiClient, PredictRequest, PredictionResponse};
use crate::output::{color_probability, print_info, print_json, print_table, OutputFormat};
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tabled::Tabled;

#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Customer")]
    customer: String,
    #[tabled(rename = "Churn")]
    churn: String,
    #[tabled(rename = "Probability")]
    probability: String,
}

/// Read customer records from a JSON file: either an array of objects or
/// a `{"records": [...]}` request body
pub fn read_records(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut body) => match body.remove("records") {
            Some(Value::Array(items)) => items,
            _ => bail!("expected a \"records\" array in {}", path.display()),
        },
        _ => bail!("expected an array of customer records in {}", path.display()),
    };

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| match record {
            Value::Object(fields) => Ok(fields),
            _ => bail!("record {} is not an object", i),
        })
        .collect()
}

/// Score customer records with the live production model
pub async fn predict(client: &ApiClient, input: &Path, format: OutputFormat) -> Result<()> {
    let records = read_records(input)?;
    let request = PredictRequest { records };
    let response: PredictionResponse = client.post("predict", &request).await?;

    if let OutputFormat::Json = format {
        print_json(&response);
        return Ok(());
    }

    let rows: Vec<PredictionRow> = response
        .predictions
        .iter()
        .zip(&request.records)
        .enumerate()
        .map(|(index, (prediction, record))| PredictionRow {
            index,
            customer: record
                .get("CustomerID")
                .map(|id| match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "-".to_string()),
            churn: if prediction.churn == 1 { "yes" } else { "no" }.to_string(),
            probability: color_probability(prediction.probability),
        })
        .collect();

    print_table(&rows);
    print_info(&format!("Scored with {}", response.model));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_bare_array() {
        let file = write_temp(r#"[{"Age": 30}, {"Age": 41}]"#);
        let records = read_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["Age"], 41);
    }

    #[test]
    fn test_reads_request_body() {
        let file = write_temp(r#"{"records": [{"Gender": "Female"}]}"#);
        let records = read_records(file.path()).unwrap();
        assert_eq!(records[0]["Gender"], "Female");
    }

    #[test]
    fn test_rejects_non_object_records() {
        let file = write_temp("[1, 2]");
        assert!(read_records(file.path()).is_err());

        let file = write_temp(r#"{"customers": []}"#);
        assert!(read_records(file.path()).is_err());
    }
}
