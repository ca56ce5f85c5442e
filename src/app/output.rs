use std::io::Write;

use zip::write::{SimpleFileOptions, ZipWriter};

use crate::core::{Storage, TableOutput};
use crate::utils::error::Result;

/// Renders the header and rows with the given delimiter.
pub fn render_delimited(header: &[String], rows: &[Vec<String>], delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| crate::utils::error::FitError::IoError(e.into_error()))
}

/// Fixed six-decimal rendering for result tables; NaN is written as `NaN`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.6}", value)
    }
}

/// Writes `table` as `{stem}.csv` / `{stem}.tsv` / `{stem}.json` plus `{stem}_summary.json`
/// and, when `bundle` is set, a `{stem}.zip` holding all of them.
/// Returns the path of the primary output under `output_path`.
pub async fn write_table<S: Storage>(
    storage: &S,
    output_path: &str,
    stem: &str,
    table: &TableOutput,
    formats: &[String],
    bundle: bool,
) -> Result<String> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    for format in formats {
        let data = match format.as_str() {
            "csv" => render_delimited(&table.header, &table.rows, b',')?,
            "tsv" => render_delimited(&table.header, &table.rows, b'\t')?,
            "json" => serde_json::to_vec_pretty(&table.records)?,
            other => {
                tracing::warn!("Skipping unsupported output format: {}", other);
                continue;
            }
        };
        files.push((format!("{}.{}", stem, format), data));
    }

    if let Some(summary) = &table.summary {
        files.push((format!("{}_summary.json", stem), serde_json::to_vec_pretty(summary)?));
    }

    for (name, data) in &files {
        tracing::debug!("Writing {} ({} bytes)", name, data.len());
        storage.write_file(name, data).await?;
    }

    if bundle {
        let zip_name = format!("{}.zip", stem);
        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
            for (name, data) in &files {
                zip.start_file(name.as_str(), SimpleFileOptions::default())?;
                zip.write_all(data)?;
            }
            zip.finish()?.into_inner()
        };

        tracing::debug!("Writing ZIP bundle ({} bytes)", zip_data.len());
        storage.write_file(&zip_name, &zip_data).await?;
        return Ok(format!("{}/{}", output_path, zip_name));
    }

    let primary = files
        .first()
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| format!("{}_summary.json", stem));
    Ok(format!("{}/{}", output_path, primary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::FitError;
    use std::collections::HashMap;
    use std::io::Read;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                FitError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    fn table() -> TableOutput {
        TableOutput {
            header: vec!["participant".to_string(), "alpha".to_string()],
            rows: vec![
                vec!["p1".to_string(), "0.300000".to_string()],
                vec!["p, 2".to_string(), "0.100000".to_string()],
            ],
            records: serde_json::json!([{"participant": "p1"}, {"participant": "p, 2"}]),
            summary: Some(serde_json::json!({"n": 2})),
        }
    }

    #[test]
    fn test_render_quotes_delimiters() {
        let t = table();
        let csv = String::from_utf8(render_delimited(&t.header, &t.rows, b',').unwrap()).unwrap();
        assert_eq!(csv, "participant,alpha\np1,0.300000\n\"p, 2\",0.100000\n");

        let tsv = String::from_utf8(render_delimited(&t.header, &t.rows, b'\t').unwrap()).unwrap();
        assert!(tsv.starts_with("participant\talpha\n"));
        assert!(tsv.contains("p, 2\t0.100000"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.25), "0.250000");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[tokio::test]
    async fn test_write_table_formats_and_summary() {
        let storage = MockStorage::default();
        let formats = vec!["csv".to_string(), "json".to_string()];
        let path = write_table(&storage, "./out", "fit_results", &table(), &formats, false)
            .await
            .unwrap();

        assert_eq!(path, "./out/fit_results.csv");
        let files = storage.files.lock().await;
        assert!(files.contains_key("fit_results.csv"));
        assert!(files.contains_key("fit_results.json"));
        assert!(files.contains_key("fit_results_summary.json"));
        assert!(!files.contains_key("fit_results.tsv"));
    }

    #[tokio::test]
    async fn test_bundle_contains_every_file() {
        let storage = MockStorage::default();
        let formats = vec!["csv".to_string(), "tsv".to_string()];
        let path = write_table(&storage, "./out", "recovery", &table(), &formats, true)
            .await
            .unwrap();
        assert_eq!(path, "./out/recovery.zip");

        let zip_data = storage.read_file("recovery.zip").await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["recovery.csv", "recovery.tsv", "recovery_summary.json"]);

        let mut csv = String::new();
        archive.by_name("recovery.csv").unwrap().read_to_string(&mut csv).unwrap();
        assert!(csv.starts_with("participant,alpha"));
    }
}
