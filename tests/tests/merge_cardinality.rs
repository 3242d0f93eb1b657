//! Join cardinality and structural load failures against files on disk.

use analysis::{run_pipeline, AnalysisConfig};
use dataset::{load_sources, merge_and_clean, MergeOptions};
use integration_tests::fixtures::{
    assignment_lines, completed_visit, day_start, demographic_line, demographic_lines, SourceFiles,
};
use integration_tests::setup::TestDataDir;

/// 1000 clients, the last 50 missing from the assignment file.
fn thousand_clients() -> SourceFiles {
    let mut files = SourceFiles::new();
    files.demographics = demographic_lines(1000);
    files.experiment = (0..950)
        .map(|i| format!("{i},{}", if i % 2 == 0 { "Control" } else { "Test" }))
        .collect();
    files
}

#[test]
fn test_unassigned_clients_are_dropped() {
    let data = TestDataDir::new(&thousand_clients());
    let sources = load_sources(&data.config).unwrap();

    let merged = merge_and_clean(sources, &MergeOptions::default()).unwrap();
    assert_eq!(merged.len(), 950);
    assert_eq!(merged.quality.records_without_assignment, 50);
}

#[test]
fn test_null_variation_rows_are_dropped() {
    let mut files = thousand_clients();
    // Blank the variation of 10 assigned clients
    for i in 0..10 {
        files.experiment[i] = format!("{i},");
    }
    let data = TestDataDir::new(&files);

    let merged = merge_and_clean(load_sources(&data.config).unwrap(), &MergeOptions::default()).unwrap();
    assert_eq!(merged.len(), 940);
    assert_eq!(merged.quality.records_dropped_missing_variation, 10);
}

#[test]
fn test_float_client_ids_join() {
    let mut files = SourceFiles::new();
    files.demographics = vec![demographic_line("1001.0", Some(40.0), "F")];
    files.web_pt_1 = completed_visit("1001", "v1", day_start());
    files.experiment = assignment_lines(&[("1001", Some("Test"))]);
    let data = TestDataDir::new(&files);

    let merged = merge_and_clean(load_sources(&data.config).unwrap(), &MergeOptions::default()).unwrap();
    assert_eq!(merged.len(), 5);
    assert!(merged.records.iter().all(|r| r.client_id() == "1001"));
}

#[test]
fn test_duplicate_demographics_fail_merge() {
    let mut files = SourceFiles::new();
    files.demographics = vec![
        demographic_line("7", Some(30.0), "M"),
        demographic_line("7", Some(31.0), "M"),
    ];
    files.experiment = assignment_lines(&[("7", Some("Control"))]);
    let data = TestDataDir::new(&files);

    let err = run_pipeline(load_sources(&data.config).unwrap(), &AnalysisConfig::default())
        .unwrap_err();
    assert_eq!(err.error_code(), Some("MERGE_001"));
}

#[test]
fn test_missing_column_fails_load() {
    let data = TestDataDir::new(&SourceFiles::balanced());
    data.overwrite(&data.config.assignments_path, "client_id,group\n1,Test\n");

    let err = load_sources(&data.config).unwrap_err();
    assert_eq!(err.error_code(), Some("LOAD_002"));
    assert!(err.to_string().contains("Variation"));
}

#[test]
fn test_missing_partition_fails_load() {
    let data = TestDataDir::new(&SourceFiles::balanced());
    std::fs::remove_file(&data.config.web_event_paths[1]).unwrap();

    let err = load_sources(&data.config).unwrap_err();
    assert_eq!(err.error_code(), Some("LOAD_001"));
}
