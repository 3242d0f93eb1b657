//! Worked scenarios run through the full pipeline.

use analysis::{run_pipeline, AnalysisConfig, PipelineOutput};
use dataset::load_sources;
use experiment_core::{ProcessStep, Variation};
use integration_tests::fixtures::{
    abandoned_visit, completed_visit, day_start, demographic_lines, visit_lines, SourceFiles,
};
use integration_tests::setup::TestDataDir;

fn run(files: &SourceFiles) -> PipelineOutput {
    let data = TestDataDir::new(files);
    run_pipeline(load_sources(&data.config).unwrap(), &AnalysisConfig::default()).unwrap()
}

/// Two clients, one per group, each with a single visit.
fn two_visits(control: Vec<String>, test: Vec<String>) -> SourceFiles {
    let mut files = SourceFiles::new();
    files.demographics = demographic_lines(2);
    files.web_pt_1 = control;
    files.web_pt_2 = test;
    files.experiment = vec!["0,Control".into(), "1,Test".into()];
    files
}

#[test]
fn test_forward_visit_timing() {
    let v1 = visit_lines("1", "V1", day_start(), &[("start", 0), ("step_1", 5), ("confirm", 30)]);
    let output = run(&two_visits(completed_visit("0", "V0", day_start()), v1));

    let events: Vec<_> = output.events.iter().filter(|e| e.visit_id() == "V1").collect();
    let spent: Vec<f64> = events.iter().map(|e| e.time_spent).collect();
    assert_eq!(spent, [0.0, 5.0, 25.0]);
    assert!(events.iter().all(|e| !e.is_back_track));

    let session = output.sessions.iter().find(|s| s.visit_id == "V1").unwrap();
    assert_eq!(session.duration_secs, 30.0);
    assert!(session.reached_confirm);
    assert_eq!(session.variation, Variation::Test);
}

#[test]
fn test_backtrack_detection() {
    let v2 = visit_lines("1", "V2", day_start(), &[("start", 0), ("step_2", 5), ("step_1", 8)]);
    let output = run(&two_visits(abandoned_visit("0", "V0", day_start()), v2));

    let events: Vec<_> = output.events.iter().filter(|e| e.visit_id() == "V2").collect();
    let indexes: Vec<u8> = events.iter().map(|e| e.step_index).collect();
    assert_eq!(indexes, [0, 2, 1]);
    let backtracks: Vec<bool> = events.iter().map(|e| e.is_back_track).collect();
    assert_eq!(backtracks, [false, false, true]);
    assert_eq!(events[2].process_step(), ProcessStep::Step1);

    let errors = output.metrics.error_rate_for(Variation::Test).unwrap();
    assert_eq!(errors.backtrack_events, 1);
    assert_eq!(errors.events, 3);
}

#[test]
fn test_completion_counts_feed_the_ztest() {
    let mut files = SourceFiles::new();
    files.demographics = demographic_lines(220);
    for i in 0..220usize {
        let client = i.to_string();
        let visit = format!("visit_{i}");
        let start = day_start() + chrono::Duration::minutes(i as i64);
        let (is_test, completes) = if i < 100 { (false, i < 40) } else { (true, i < 160) };
        let lines = if completes {
            completed_visit(&client, &visit, start)
        } else {
            abandoned_visit(&client, &visit, start)
        };
        files.web_pt_1.extend(lines);
        files
            .experiment
            .push(format!("{client},{}", if is_test { "Test" } else { "Control" }));
    }

    let output = run(&files);
    let control = output.metrics.completion_for(Variation::Control).unwrap();
    let test = output.metrics.completion_for(Variation::Test).unwrap();
    assert_eq!((control.completed_visits, control.total_visits), (40, 100));
    assert_eq!((test.completed_visits, test.total_visits), (60, 120));
    assert!((control.completion_rate.unwrap() - 40.0).abs() < 1e-9);
    assert!((test.completion_rate.unwrap() - 50.0).abs() < 1e-9);

    let outcome = &output.comparisons.completion.outcome;
    assert!((outcome.statistic.unwrap().abs() - 1.4832).abs() < 1e-3);
    assert!((outcome.p_value.unwrap() - 0.1380).abs() < 1e-3);
}

#[test]
fn test_unknown_steps_are_rejected_not_fatal() {
    let mut test_visit = completed_visit("1", "V1", day_start());
    test_visit.extend(visit_lines("1", "V1", day_start(), &[("checkout", 200)]));
    let output = run(&two_visits(completed_visit("0", "V0", day_start()), test_visit));

    assert_eq!(output.quality.unknown_steps, 1);
    assert_eq!(output.events.len(), 10);
}

#[test]
fn test_empty_group_fails_comparison() {
    let mut files = SourceFiles::new();
    files.demographics = demographic_lines(2);
    files.web_pt_1 = completed_visit("0", "V0", day_start());
    files.web_pt_2 = completed_visit("1", "V1", day_start());
    files.experiment = vec!["0,Control".into(), "1,Control".into()];

    let data = TestDataDir::new(&files);
    let err = run_pipeline(load_sources(&data.config).unwrap(), &AnalysisConfig::default())
        .unwrap_err();
    assert_eq!(err.error_code(), Some("GROUP_001"));
}

#[test]
fn test_fractional_timestamps_sum_to_span() {
    let test_visit: Vec<String> = ["00.6", "01.2", "01.8"]
        .iter()
        .zip(["start", "step_1", "step_2"])
        .map(|(secs, step)| format!("1,1_visitor,VF,{step},2017-04-03 15:00:{secs}"))
        .collect();
    let output = run(&two_visits(completed_visit("0", "V0", day_start()), test_visit));

    let spent: Vec<f64> = output
        .events
        .iter()
        .filter(|e| e.visit_id() == "VF")
        .map(|e| e.time_spent)
        .collect();
    assert_eq!(spent, [0.0, 0.6, 0.6]);

    let session = output.sessions.iter().find(|s| s.visit_id == "VF").unwrap();
    assert!((session.duration_secs - 1.2).abs() < 1e-9);
    assert!((session.duration_secs - session.span_secs()).abs() < 1e-9);
}
