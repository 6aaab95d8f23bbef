use crate::assembler::OutputMode;
use crate::config::PipelineConfig;
use crate::types::{AttributeDomain, DetectionResult, DetectionSummary};
use anyhow::Result;
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// Report Types
// ============================================================================

/// Everything worth keeping about a detection run, for `--json` output and
/// `--emit-report` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub generated_at: String,
    pub input_file: String,
    pub output_file: Option<String>,
    /// Path of the noisy-cell matrix CSV, when one was written
    pub matrix_file: Option<String>,
    pub output_mode: OutputMode,
    pub config: PipelineConfig,
    pub summary: DetectionSummary,
    /// Domain of every attribute, with interval or category labels
    pub domains: Vec<AttributeDomain>,
    /// Zero-based indices of the records flagged noisy
    pub noisy_record_indices: Vec<usize>,
}

// ============================================================================
// Report Generator
// ============================================================================

/// Writes the output dataset, the noisy-cell matrix and the JSON report.
///
/// File names are derived from one base name: `<base>.csv`,
/// `<base>_noisy_cells.csv` and `<base>_report.json`.
pub struct ReportGenerator {
    output_dir: PathBuf,
    output_name: Option<String>,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./outputs"),
            output_name: None,
        }
    }
}

impl ReportGenerator {
    pub fn new(output_dir: PathBuf, output_name: Option<String>) -> Self {
        Self {
            output_dir,
            output_name,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Base name for output files: the configured name, or `<input stem>_denoised`.
    pub fn base_name(&self, input_stem: &str) -> String {
        self.output_name
            .clone()
            .unwrap_or_else(|| format!("{}_denoised", input_stem))
    }

    /// Save the assembled dataset as `<base>.csv`.
    pub fn save_output_csv(&self, df: &mut DataFrame, base_name: &str) -> Result<PathBuf> {
        let path = self.write_csv(df, &format!("{}.csv", base_name))?;
        info!("Dataset saved: {}", path.display());
        Ok(path)
    }

    /// Save the noisy-cell matrix as `<base>_noisy_cells.csv`, one 0/1 column per attribute.
    pub fn write_matrix_csv(&self, result: &DetectionResult, base_name: &str) -> Result<PathBuf> {
        let names: Vec<String> = result.domains.iter().map(|d| d.name.clone()).collect();
        let mut frame = result.noisy_cells.to_frame(&names)?;
        let path = self.write_csv(&mut frame, &format!("{}_noisy_cells.csv", base_name))?;
        info!("Noisy-cell matrix saved: {}", path.display());
        Ok(path)
    }

    fn write_csv(&self, df: &mut DataFrame, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(file_name);
        let mut file = File::create(&path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(df)?;

        Ok(path)
    }

    /// Assemble the report of a finished run.
    pub fn build_report(
        input_file: &str,
        output_file: Option<&str>,
        matrix_file: Option<&str>,
        config: &PipelineConfig,
        result: &DetectionResult,
    ) -> DetectionReport {
        let noisy_record_indices = result
            .noisy_records
            .iter()
            .enumerate()
            .filter(|(_, noisy)| **noisy)
            .map(|(idx, _)| idx)
            .collect();

        DetectionReport {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            input_file: input_file.to_string(),
            output_file: output_file.map(String::from),
            matrix_file: matrix_file.map(String::from),
            output_mode: OutputMode::from_config(config),
            config: config.clone(),
            summary: result.summary.clone(),
            domains: result.domains.clone(),
            noisy_record_indices,
        }
    }

    /// Write the report as pretty JSON to `<base>_report.json`.
    pub fn write_report(&self, report: &DetectionReport, base_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let report_path = self.output_dir.join(format!("{}_report.json", base_name));
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lex-noise-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn run() -> (PipelineConfig, DetectionResult) {
        let mut left = vec!["a"; 5];
        left.extend(["b"; 4]);
        left.push("a");
        let mut right = vec!["x"; 5];
        right.extend(["y"; 4]);
        right.push("y");
        let df = df!("left" => &left, "right" => &right).unwrap();

        let config = PipelineConfig::builder().make_noisy_missing(false).build().unwrap();
        let result = Pipeline::builder()
            .config(config.clone())
            .build()
            .unwrap()
            .process(df)
            .unwrap();
        (config, result)
    }

    #[test]
    fn test_base_name() {
        let generator = ReportGenerator::default();
        assert_eq!(generator.base_name("census"), "census_denoised");

        let generator = ReportGenerator::new(PathBuf::from("out"), Some("clean".to_string()));
        assert_eq!(generator.base_name("census"), "clean");
    }

    #[test]
    fn test_build_report() {
        let (config, result) = run();
        let report =
            ReportGenerator::build_report("in.csv", Some("out.csv"), None, &config, &result);

        assert_eq!(report.noisy_record_indices, vec![9]);
        assert_eq!(report.output_mode, OutputMode::Indicator);
        assert_eq!(report.domains.len(), 2);
        assert!(report.matrix_file.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["noisy_records"], 1);
        assert_eq!(json["output_mode"], "indicator");
        assert_eq!(json["domains"][0]["kind"], "free_text");
    }

    #[test]
    fn test_writes_files() {
        let (config, mut result) = run();
        let dir = scratch_dir("writes-files");
        let generator = ReportGenerator::new(dir.clone(), None);
        let base = generator.base_name("pairs");

        let output = generator.save_output_csv(&mut result.output, &base).unwrap();
        let matrix = generator.write_matrix_csv(&result, &base).unwrap();
        let report = ReportGenerator::build_report(
            "pairs.csv",
            Some(&output.to_string_lossy()),
            Some(&matrix.to_string_lossy()),
            &config,
            &result,
        );
        let report_path = generator.write_report(&report, &base).unwrap();

        let csv = fs::read_to_string(&output).unwrap();
        assert!(csv.starts_with("Noisy,left,right"));
        assert_eq!(csv.lines().count(), 11);

        let matrix_csv = fs::read_to_string(&matrix).unwrap();
        assert_eq!(matrix_csv.lines().nth(10), Some("1,1"));

        let parsed: DetectionReport =
            serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(parsed.noisy_record_indices, vec![9]);

        fs::remove_dir_all(&dir).unwrap();
    }
}
