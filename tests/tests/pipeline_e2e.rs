//! End-to-end: source files → pipeline → merged dataset and reports on disk.

use analysis::{run_pipeline, AnalysisConfig, Significance};
use dataset::{load_sources, write_dataset};
use experiment_core::schema::OUTPUT_COLUMNS;
use experiment_core::Variation;
use integration_tests::fixtures::SourceFiles;
use integration_tests::setup::TestDataDir;
use report::{render_report, JsonSink, TextSink};
use telemetry::metrics;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_balanced_run_end_to_end() {
    let data = TestDataDir::new(&SourceFiles::balanced());
    let sources = load_sources(&data.config).unwrap();
    assert_eq!(sources.demographics.len(), 20);
    assert_eq!(sources.web_events.len(), 100);
    assert_eq!(sources.assignments.len(), 20);

    let sessions_before = metrics().sessions_reconstructed.get();
    let output = run_pipeline(sources, &AnalysisConfig::default()).unwrap();
    assert!(metrics().sessions_reconstructed.get() >= sessions_before + 20);
    assert_eq!(output.records.len(), 100);
    assert_eq!(output.events.len(), 100);
    assert_eq!(output.sessions.len(), 20);

    let control = output.metrics.completion_for(Variation::Control).unwrap();
    let test = output.metrics.completion_for(Variation::Test).unwrap();
    assert_eq!(control.total_visits, 10);
    assert_eq!(control.completed_visits, 5);
    assert_eq!(test.completed_visits, 8);
    assert!(approx(output.comparisons.completion.observed_increase.unwrap(), 30.0));

    // Completed visits last 150s, abandoned ones 80s
    for session in &output.sessions {
        let expected = if session.reached_confirm { 150.0 } else { 80.0 };
        assert_eq!(session.duration_secs, expected, "visit {}", session.visit_id);
    }

    // Per-step comparisons exist for every step both groups reached
    assert!(!output.comparisons.step_durations.is_empty());
    assert_ne!(output.comparisons.session_duration.outcome.significance, Significance::Undetermined);
}

#[test]
fn test_merged_dataset_round_trip() {
    let data = TestDataDir::new(&SourceFiles::balanced());
    let output = run_pipeline(load_sources(&data.config).unwrap(), &AnalysisConfig::default()).unwrap();

    let path = data.output_path("variation_df.csv");
    write_dataset(&path, &output.output_rows()).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(header, OUTPUT_COLUMNS);

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 100);

    let col = |name: &str| OUTPUT_COLUMNS.iter().position(|c| *c == name).unwrap();
    let backtracks = rows.iter().filter(|r| &r[col("is_back_track")] == "True").count();
    // One backtrack per abandoned visit: 5 control + 2 test
    assert_eq!(backtracks, 7);
    assert!(rows
        .iter()
        .all(|r| matches!(&r[col("is_back_track")], "True" | "False")));

    // time_spent sums to the visit span
    let total: f64 = rows.iter().map(|r| r[col("time_spent")].parse::<f64>().unwrap()).sum();
    assert_eq!(total, (13 * 150 + 7 * 80) as f64);
    assert_eq!(&rows[1][col("time_spent")], "15.0");

    assert_eq!(&rows[0][col("clnt_tenure_mnth")], "73.0");
    assert_eq!(&rows[0][col("client_status")], "Long-standing");
}

#[test]
fn test_reports_render() {
    let data = TestDataDir::new(&SourceFiles::balanced());
    let output = run_pipeline(load_sources(&data.config).unwrap(), &AnalysisConfig::default()).unwrap();

    let mut text = TextSink::new(Vec::new());
    render_report(&output, &mut text).unwrap();
    let rendered = String::from_utf8(text.into_inner()).unwrap();
    assert!(rendered.contains("== Data quality =="));
    assert!(rendered.contains("== Client base =="));
    assert!(rendered.contains("== Cost effectiveness =="));

    let json_path = data.output_path("report.json");
    let mut json = JsonSink::new(&json_path);
    render_report(&output, &mut json).unwrap();

    let raw = std::fs::read_to_string(&json_path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let sections = doc["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 8);
    assert_eq!(sections[0]["title"], "Data quality");
    assert_eq!(sections[1]["title"], "Client base");
    // Balance summary over all 20 clients
    assert_eq!(sections[1]["tables"][0]["rows"][0][0], 20);
}

#[test]
fn test_runs_are_byte_identical() {
    let data = TestDataDir::new(&SourceFiles::balanced());

    let mut written = Vec::new();
    for name in ["a.csv", "b.csv"] {
        let output =
            run_pipeline(load_sources(&data.config).unwrap(), &AnalysisConfig::default()).unwrap();
        let path = data.output_path(name);
        write_dataset(&path, &output.output_rows()).unwrap();
        written.push(std::fs::read(&path).unwrap());
    }
    assert_eq!(written[0], written[1]);
}
