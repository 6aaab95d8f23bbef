//! Report generation module.
//!
//! Saves the assembled dataset and, on request, the noisy-cell matrix and
//! a JSON [`DetectionReport`]. The same report struct backs the CLI's
//! `--json` output.
//!
//! ```rust,ignore
//! use lex_noise::reporting::ReportGenerator;
//!
//! let generator = ReportGenerator::new(PathBuf::from("outputs"), None);
//! let base = generator.base_name("census");
//! let output = generator.save_output_csv(&mut result.output, &base)?;
//! let report = ReportGenerator::build_report("census.csv", Some(&output.to_string_lossy()), None, &config, &result);
//! generator.write_report(&report, &base)?;
//! ```

mod generator;

pub use generator::{DetectionReport, ReportGenerator};
