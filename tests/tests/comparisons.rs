//! Running comparisons leaves the global telemetry counters alone.
//!
//! Kept in its own test binary: nothing else here runs the pipeline, so the
//! counters cannot move underneath the assertions.

use analysis::{compute_metrics, reconstruct, sessions, StatisticalComparator};
use dataset::{load_sources, merge_and_clean, MergeOptions};
use integration_tests::fixtures::SourceFiles;
use integration_tests::setup::TestDataDir;
use telemetry::metrics;

#[test]
fn test_compare_all_leaves_counters_untouched() {
    let data = TestDataDir::new(&SourceFiles::balanced());
    let merged = merge_and_clean(load_sources(&data.config).unwrap(), &MergeOptions::default()).unwrap();
    let events = reconstruct(&merged.records).events;
    let tables = compute_metrics(&events, &sessions(&events));

    let before = metrics().snapshot();
    let comparator = StatisticalComparator::default();
    let first = comparator.compare_all(&tables).unwrap();
    let second = comparator.compare_all(&tables).unwrap();
    let after = metrics().snapshot();

    assert_eq!(first, second);
    assert_eq!(before.statistical_tests_run, after.statistical_tests_run);
    assert_eq!(before.statistical_tests_undetermined, after.statistical_tests_undetermined);
}
