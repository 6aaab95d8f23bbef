//! Integration tests for the noise detection pipeline.
//!
//! These tests run the whole pipeline over the CSV fixtures and over small
//! in-memory frames.

use lex_noise::{
    AttributeKind, CamStorageKind, CancellationToken, DetectionError, DetectionResult,
    DetectionStage, Pipeline, PipelineConfig, ZeroBinPolicy,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_try_parse_dates(true))
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn run(df: DataFrame, config: PipelineConfig) -> DetectionResult {
    Pipeline::builder()
        .config(config)
        .build()
        .expect("valid config")
        .process(df)
        .expect("detection should succeed")
}

fn with_lambda(lambda: f64) -> PipelineConfig {
    PipelineConfig::builder()
        .coappearance_score_threshold(lambda)
        .build()
        .unwrap()
}

fn strings(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    df.column(column)
        .unwrap()
        .cast(&DataType::String)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(String::from))
        .collect()
}

// ============================================================================
// Hand-checked Fixture
// ============================================================================

#[test]
fn test_rare_combination_is_flagged() {
    let df = load_csv("wards.csv");
    let result = run(df.clone(), PipelineConfig::default());

    let flagged: Vec<usize> = (0..result.noisy_records.len())
        .filter(|&r| result.noisy_records[r])
        .collect();
    assert_eq!(flagged, vec![11]);
    assert_eq!(result.noisy_cells.row(11), &[true, true, true]);

    // missing-value mode nulls exactly that record
    let ward = strings(&result.output, "ward");
    assert_eq!(ward[11], None);
    assert_eq!(ward[0].as_deref(), Some("A"));
    assert_eq!(result.output.column("unit").unwrap().null_count(), 1);
}

#[test]
fn test_higher_lambda_pinpoints_attribute() {
    // ward scores 4/4, shift and unit 2/4
    let result = run(load_csv("wards.csv"), with_lambda(0.6));
    assert_eq!(result.noisy_cells.row(11), &[true, false, false]);
    assert_eq!(result.summary.noisy_cells, 1);
}

#[test]
fn test_indicator_mode() {
    let df = load_csv("wards.csv");
    let config = PipelineConfig::builder()
        .make_noisy_missing(false)
        .build()
        .unwrap();
    let result = run(df.clone(), config);

    assert_eq!(result.output.width(), df.width() + 1);
    assert_eq!(result.output.get_column_names()[0].as_str(), "Noisy");
    assert!(matches!(
        result.output.column("Noisy").unwrap().dtype(),
        DataType::Enum(_, _)
    ));

    let indicator = strings(&result.output, "Noisy");
    let expected: Vec<Option<String>> = (0..12)
        .map(|r| Some(if r == 11 { "True" } else { "False" }.to_string()))
        .collect();
    assert_eq!(indicator, expected);

    assert!(result.output.drop("Noisy").unwrap().equals_missing(&df));
}

// ============================================================================
// Mixed-type Fixture
// ============================================================================

#[test]
fn test_mixed_types_are_generalized_by_kind() {
    let df = load_csv("patients.csv");
    assert_eq!(df.column("visit_date").unwrap().dtype(), &DataType::Date);

    let result = run(df, PipelineConfig::default());
    let kinds: Vec<AttributeKind> = result.domains.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AttributeKind::Numeric,
            AttributeKind::Temporal,
            AttributeKind::FreeText,
            AttributeKind::FreeText,
            AttributeKind::FreeText,
            AttributeKind::Numeric,
        ]
    );

    let blood = &result.domains[2];
    assert_eq!(blood.labels, vec!["O+", "A+", "B+"]);
    assert_eq!(result.domains[4].size, 3);
}

#[test]
fn test_shapes_and_record_flags_are_consistent() {
    let df = load_csv("patients.csv");
    let result = run(df.clone(), PipelineConfig::default());

    assert_eq!(result.noisy_cells.shape(), df.shape());
    assert_eq!(result.output.shape(), df.shape());
    assert_eq!(result.domain_sizes().len(), df.width());

    for (record, &noisy) in result.noisy_records.iter().enumerate() {
        assert_eq!(noisy, result.noisy_cells.row(record).iter().any(|&c| c));
    }
    assert_eq!(
        result.summary.noisy_records,
        result.noisy_records.iter().filter(|&&n| n).count()
    );
}

#[test]
fn test_inconsistent_ward_records_are_flagged() {
    let result = run(load_csv("patients.csv"), PipelineConfig::default());
    let ward = result
        .domains
        .iter()
        .position(|d| d.name == "ward")
        .unwrap();

    for record in [7, 31, 52] {
        assert!(
            result.noisy_cells.is_noisy(record, ward),
            "record {} should have a noisy ward",
            record
        );
    }
}

#[test]
fn test_missing_mode_nulls_exactly_flagged_cells() {
    let df = load_csv("patients.csv");
    let result = run(df.clone(), PipelineConfig::default());
    let counts = result.noisy_cells.attribute_counts();

    for (attribute, column) in df.get_columns().iter().enumerate() {
        let after = result.output.column(column.name()).unwrap();
        assert_eq!(
            after.null_count(),
            column.null_count() + counts[attribute],
            "column {}",
            column.name()
        );
        assert_eq!(after.dtype(), column.dtype());
    }
}

#[test]
fn test_missing_cells_are_never_flagged() {
    let df = load_csv("patients.csv");
    let result = run(df.clone(), with_lambda(0.05));

    for (attribute, column) in df.get_columns().iter().enumerate() {
        let nulls = column.as_materialized_series().is_null();
        for (record, is_null) in nulls.into_iter().enumerate() {
            if is_null == Some(true) {
                assert!(!result.noisy_cells.is_noisy(record, attribute));
            }
        }
    }
}

#[test]
fn test_runs_are_deterministic() {
    let df = load_csv("patients.csv");
    let first = run(df.clone(), PipelineConfig::default());
    let second = run(df, PipelineConfig::default());

    assert_eq!(first.noisy_cells, second.noisy_cells);
    assert!(first.output.equals_missing(&second.output));
}

#[test]
fn test_raising_lambda_never_flags_more_records() {
    let df = load_csv("patients.csv");
    let mut previous = usize::MAX;

    for lambda in [0.1, 0.2, 0.3, 0.4, 0.6, 0.8, 1.0] {
        let flagged = run(df.clone(), with_lambda(lambda)).summary.noisy_records;
        assert!(
            flagged <= previous,
            "lambda {} flagged {} records, more than {}",
            lambda,
            flagged,
            previous
        );
        previous = flagged;
    }
}

#[test]
fn test_sparse_storage_gives_same_result() {
    let df = load_csv("patients.csv");
    let dense = run(df.clone(), PipelineConfig::default());
    let sparse = run(
        df,
        PipelineConfig::builder().dense_cell_limit(0).build().unwrap(),
    );

    assert_eq!(dense.summary.cam_storage, CamStorageKind::Dense);
    assert_eq!(sparse.summary.cam_storage, CamStorageKind::Sparse);
    assert_eq!(dense.noisy_cells, sparse.noisy_cells);
}

// ============================================================================
// Edge Cases
// ============================================================================

#[test]
fn test_uniform_data_with_declared_domains_is_clean() {
    let df = df!(
        "left" => &["a"; 6],
        "right" => &["x"; 6]
    )
    .unwrap();
    let config = PipelineConfig::builder()
        .coappearance_threshold(1.0)
        .declared_domain("left", ["a", "b"])
        .declared_domain("right", ["x", "y"])
        .build()
        .unwrap();

    let result = run(df.clone(), config);
    assert_eq!(result.domain_sizes(), vec![2, 2]);
    assert_eq!(result.summary.noisy_records, 0);
    assert!(result.output.equals_missing(&df));
}

#[test]
fn test_single_attribute_is_never_flagged() {
    let df = df!("only" => &["a", "b", "c", "a"]).unwrap();
    let result = run(df.clone(), with_lambda(0.01));

    assert_eq!(result.noisy_cells.shape(), (4, 1));
    assert_eq!(result.summary.noisy_cells, 0);
    assert!(result.output.equals_missing(&df));
}

#[test]
fn test_empty_dataset() {
    let df = df!(
        "a" => Vec::<i64>::new(),
        "b" => Vec::<String>::new()
    )
    .unwrap();
    let result = run(df, PipelineConfig::default());

    assert_eq!(result.noisy_cells.shape(), (0, 2));
    assert_eq!(result.output.height(), 0);
    assert_eq!(result.summary.noisy_record_percentage(), 0.0);
}

#[test]
fn test_constant_column_single_bin_and_reject() {
    let df = df!(
        "constant" => &[3.0, 3.0, 3.0, 3.0],
        "label" => &["a", "a", "b", "b"]
    )
    .unwrap();

    let result = run(df.clone(), PipelineConfig::default());
    assert_eq!(result.domain_sizes(), vec![1, 2]);
    assert_eq!(result.summary.warnings.len(), 1);

    let config = PipelineConfig::builder()
        .zero_bin_policy(ZeroBinPolicy::Reject)
        .build()
        .unwrap();
    let err = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(df)
        .unwrap_err();
    assert_eq!(err.error_code(), "GENERALIZATION_FAILED");
    assert_eq!(err.stage(), Some(DetectionStage::Generalization));
}

#[test]
fn test_unknown_nominal_column() {
    let config = PipelineConfig::builder()
        .nominal_column("missing")
        .build()
        .unwrap();
    let err = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(load_csv("wards.csv"))
        .unwrap_err();

    assert!(matches!(err, DetectionError::ColumnNotFound(ref c) if c == "missing"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_thresholds_outside_unit_interval_are_rejected() {
    for tau in [0.0, -0.1, 1.01, f64::NAN] {
        assert!(
            PipelineConfig::builder()
                .coappearance_threshold(tau)
                .build()
                .is_err(),
            "tau {} should be rejected",
            tau
        );
    }
    assert!(
        PipelineConfig::builder()
            .coappearance_score_threshold(1.5)
            .build()
            .is_err()
    );
    assert!(
        PipelineConfig::builder()
            .coappearance_threshold(1.0)
            .coappearance_score_threshold(1.0)
            .build()
            .is_ok()
    );
}

// ============================================================================
// Progress and Cancellation
// ============================================================================

#[test]
fn test_cancellation_before_start() {
    let token = CancellationToken::new();
    token.cancel();

    let result = Pipeline::builder()
        .cancellation_token(token)
        .build()
        .unwrap()
        .process(load_csv("wards.csv"));

    assert!(matches!(result, Err(DetectionError::Cancelled)));
}

#[test]
fn test_progress_ends_with_complete() {
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = stages.clone();

    Pipeline::builder()
        .on_progress(move |update| {
            assert!((0.0..=1.0).contains(&update.progress));
            sink.lock().unwrap().push(update.stage);
        })
        .build()
        .unwrap()
        .process(load_csv("patients.csv"))
        .unwrap();

    let stages = stages.lock().unwrap();
    assert_eq!(stages.first(), Some(&DetectionStage::Initializing));
    assert_eq!(stages.last(), Some(&DetectionStage::Complete));
    assert!(stages.contains(&DetectionStage::Scoring));
}
