//! Turns a pipeline run into report sections.

use analysis::{HistogramBin, PipelineOutput, TestOutcome};
use experiment_core::{ProcessStep, Result, Variation};
use tracing::debug;

use crate::sink::{Cell, Figure, FigureKind, ReportSink, Table};

const TEST_COLUMNS: [&str; 4] = ["test", "statistic", "p_value", "significance"];

fn test_row(name: &str, outcome: &TestOutcome) -> Vec<Cell> {
    vec![
        name.into(),
        outcome.statistic.into(),
        outcome.p_value.into(),
        outcome.significance.as_str().into(),
    ]
}

/// Emits every report section into `sink`, then finishes it.
pub fn render_report(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    data_quality(output, sink)?;
    client_base(output, sink)?;
    demographics(output, sink)?;
    completion(output, sink)?;
    step_durations(output, sink)?;
    session_duration(output, sink)?;
    error_rates(output, sink)?;
    cost_effectiveness(output, sink)?;
    sink.finish()
}

fn data_quality(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    let quality = &output.quality;
    sink.begin_section("Data quality")?;

    let mut sources = Table::new("Sources", &["source", "rows_read", "rows_accepted", "rows_rejected"]);
    let mut nulls = Table::new("Null cells", &["source", "column", "nulls"]);
    for source in &quality.sources {
        sources.push_row(vec![
            source.name.as_str().into(),
            source.rows_read.into(),
            source.rows_accepted.into(),
            source.rows_rejected.into(),
        ]);
        for (column, count) in &source.null_counts {
            nulls.push_row(vec![source.name.as_str().into(), column.as_str().into(), (*count).into()]);
        }
    }
    sink.table(&sources)?;
    sink.table(&nulls)?;

    let anomalies = [
        ("unknown process step", quality.unknown_steps),
        ("invalid timestamp", quality.invalid_timestamps),
        ("invalid variation", quality.invalid_variations),
        ("failed validation", quality.failed_validation),
        ("malformed row", quality.malformed_rows),
        ("demographics with null bal or clnt_age", quality.demographics_dropped_null_critical),
        ("duplicate assignments collapsed", quality.duplicate_assignments_collapsed),
        ("clients with conflicting assignments", quality.conflicting_assignment_clients),
        ("web events of unknown clients", quality.web_events_without_client),
        ("records without assignment", quality.records_without_assignment),
        ("records with missing variation", quality.records_dropped_missing_variation),
        ("records of conflicting clients", quality.records_dropped_conflicting_assignment),
        ("visits with conflicting variations", quality.conflicting_visits),
        ("records of conflicting visits", quality.records_dropped_conflicting_visit),
        ("records without web activity", quality.records_without_activity),
        ("negative time gaps clamped", quality.negative_durations),
    ];
    let mut table = Table::new("Anomalies", &["reason", "count"]);
    for (reason, count) in anomalies {
        table.push_row(vec![reason.into(), count.into()]);
    }
    sink.table(&table)
}

fn histogram_table(title: &str, bins: &[HistogramBin]) -> Table {
    let mut table = Table::new(title, &["from", "to", "clients"]);
    for bin in bins {
        table.push_row(vec![bin.lower.into(), bin.upper.into(), bin.count.into()]);
    }
    table
}

fn client_base(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    let profile = &output.dataset_profile;
    sink.begin_section("Client base")?;

    let mut balance = Table::new(
        "Balance",
        &["count", "mean", "std", "min", "25%", "50%", "75%", "max"],
    );
    if let Some(stats) = &profile.balance {
        balance.push_row(vec![
            stats.count.into(),
            stats.mean.into(),
            stats.std.into(),
            stats.min.into(),
            stats.q1.into(),
            stats.median.into(),
            stats.q3.into(),
            stats.max.into(),
        ]);
    }
    sink.table(&balance)?;

    let mut accounts = Table::new("Number of accounts", &["num_accts", "clients"]);
    for count in &profile.account_counts {
        accounts.push_row(vec![count.value.into(), count.clients.into()]);
    }
    sink.table(&accounts)?;
    sink.figure(&Figure::new(FigureKind::Pie, "num_accts", "clients", accounts.clone()))?;
    sink.figure(&Figure::new(FigureKind::Bar, "num_accts", "clients", accounts))?;

    let mut genders = Table::new("Gender distribution, all clients", &["gendr", "clients"]);
    for (gender, count) in &profile.gender_counts {
        genders.push_row(vec![gender.as_str().into(), (*count).into()]);
    }
    sink.table(&genders)?;
    sink.figure(&Figure::new(FigureKind::Pie, "gendr", "clients", genders))?;

    for (title, bins) in [
        ("Client tenure in years", &profile.tenure_years_histogram),
        ("Client age", &profile.age_histogram),
        ("Logons in the past 6 months", &profile.logons_histogram),
    ] {
        let table = histogram_table(title, bins);
        sink.table(&table)?;
        sink.figure(&Figure::new(FigureKind::Histogram, "from", "clients", table))?;
    }
    Ok(())
}

fn demographics(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    let profiles = &output.profiles;
    sink.begin_section("Demographics")?;

    let mut groups = Table::new("Clients per variation", &["Variation", "clients", "mean_age"]);
    let mut genders = Table::new("Gender distribution", &["Variation", "gendr", "clients"]);
    let mut ages = Table::new("Age distribution", &["Variation", "age_from", "age_to", "clients"]);
    for group in &profiles.groups {
        let variation = group.variation.as_str();
        groups.push_row(vec![variation.into(), group.clients.into(), group.mean_age.into()]);
        for (gender, count) in &group.gender_counts {
            genders.push_row(vec![variation.into(), gender.as_str().into(), (*count).into()]);
        }
        for bin in &group.age_histogram {
            ages.push_row(vec![variation.into(), bin.lower.into(), bin.upper.into(), bin.count.into()]);
        }
    }
    sink.table(&groups)?;
    sink.table(&genders)?;

    for variation in Variation::ALL {
        let mut pie = Table::new(format!("Gender distribution, {}", variation), &["gendr", "clients"]);
        if let Some(group) = profiles.group(variation) {
            for (gender, count) in &group.gender_counts {
                pie.push_row(vec![gender.as_str().into(), (*count).into()]);
            }
        }
        sink.figure(&Figure::new(FigureKind::Pie, "gendr", "clients", pie))?;
    }

    sink.table(&ages)?;
    sink.figure(&Figure::new(FigureKind::Histogram, "age_from", "clients", ages).grouped_by("Variation"))?;

    let mut segments = Table::new("Primary clients", &["client_status", "age_group", "clients"]);
    for segment in &profiles.primary_segments {
        segments.push_row(vec![
            segment.client_status.map(|s| s.as_str()).into(),
            segment.age_group.map(|g| g.as_str()).into(),
            segment.clients.into(),
        ]);
    }
    sink.table(&segments)?;
    sink.figure(
        &Figure::new(FigureKind::GroupedBar, "client_status", "clients", segments).grouped_by("age_group"),
    )
}

fn completion(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    let test = &output.comparisons.completion;
    sink.begin_section("Completion")?;

    let mut table = Table::new(
        "Completion rate",
        &["Variation", "visits", "completed_visits", "completion_rate"],
    );
    for summary in &output.metrics.completion {
        table.push_row(vec![
            summary.variation.as_str().into(),
            summary.total_visits.into(),
            summary.completed_visits.into(),
            summary.completion_rate.into(),
        ]);
    }
    sink.table(&table)?;
    sink.figure(&Figure::new(FigureKind::Bar, "Variation", "completion_rate", table))?;

    let tests = Table::new("Two-proportion z-test", &TEST_COLUMNS)
        .with_row(test_row("completion rate, Control vs Test", &test.outcome));
    sink.table(&tests)?;

    let increase = Table::new("Observed increase", &["control_rate", "test_rate", "increase_points"])
        .with_row(vec![test.control_rate.into(), test.test_rate.into(), test.observed_increase.into()]);
    sink.table(&increase)
}

fn step_durations(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    sink.begin_section("Step durations")?;

    let mut means = Table::new("Mean time per step", &["process_step", "Variation", "events", "mean_secs"]);
    for duration in output
        .metrics
        .step_durations
        .iter()
        .chain(&output.metrics.overall_step_durations)
    {
        means.push_row(vec![
            duration.step.as_str().into(),
            duration.variation.map_or("All", |v| v.as_str()).into(),
            duration.count.into(),
            duration.mean_secs.into(),
        ]);
    }
    sink.table(&means)?;

    let mut tests = Table::new(
        "Welch's t-test per step",
        &["process_step", "control_mean", "test_mean", "statistic", "p_value", "significance"],
    );
    for comparison in &output.comparisons.step_durations {
        let outcome = &comparison.outcome;
        tests.push_row(vec![
            comparison.step.as_str().into(),
            comparison.control_mean.into(),
            comparison.test_mean.into(),
            outcome.statistic.into(),
            outcome.p_value.into(),
            outcome.significance.as_str().into(),
        ]);
    }
    sink.table(&tests)?;

    let mut chart = Table::new("Mean time per step by variation", &["process_step", "Variation", "mean_secs"]);
    for step in ProcessStep::ORDERED {
        for variation in Variation::ALL {
            let mean = output
                .metrics
                .step_duration_for(variation, step)
                .and_then(|d| d.mean_secs);
            chart.push_row(vec![step.as_str().into(), variation.as_str().into(), mean.into()]);
        }
    }
    sink.figure(&Figure::new(FigureKind::GroupedBar, "process_step", "mean_secs", chart).grouped_by("Variation"))
}

fn session_duration(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    let test = &output.comparisons.session_duration;
    sink.begin_section("Session duration")?;

    let mut table = Table::new("Mean session duration", &["Variation", "sessions", "mean_duration_secs"]);
    for summary in &output.metrics.summaries {
        table.push_row(vec![
            summary.variation.as_str().into(),
            summary.total_sessions.into(),
            summary.mean_session_duration.into(),
        ]);
    }
    sink.table(&table)?;
    sink.figure(&Figure::new(FigureKind::Bar, "Variation", "mean_duration_secs", table))?;

    let tests = Table::new("Pooled t-test, Test longer than Control", &TEST_COLUMNS)
        .with_row(test_row("session duration", &test.outcome));
    sink.table(&tests)
}

fn error_rates(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    let test = &output.comparisons.error_rate;
    sink.begin_section("Error rates")?;

    let mut table = Table::new(
        "Backtrack rate",
        &["Variation", "events", "backtrack_events", "error_rate", "sessions", "sessions_with_backtrack"],
    );
    for rate in &output.metrics.error_rates {
        table.push_row(vec![
            rate.variation.as_str().into(),
            rate.events.into(),
            rate.backtrack_events.into(),
            rate.rate.into(),
            rate.sessions.into(),
            rate.sessions_with_backtrack.into(),
        ]);
    }
    sink.table(&table)?;
    sink.figure(&Figure::new(FigureKind::Bar, "Variation", "error_rate", table))?;

    let name = if test.yates_correction {
        "backtracks, Variation x is_back_track (Yates)"
    } else {
        "backtracks, Variation x is_back_track"
    };
    let tests = Table::new("Chi-square test of independence", &TEST_COLUMNS)
        .with_row(test_row(name, &test.outcome));
    sink.table(&tests)
}

fn cost_effectiveness(output: &PipelineOutput, sink: &mut dyn ReportSink) -> Result<()> {
    let result = &output.comparisons.cost_effectiveness;
    sink.begin_section("Cost effectiveness")?;

    let table = Table::new(
        "Per-client completion, Test group",
        &[
            "clients",
            "mean_completion",
            "threshold",
            "observed_increase",
            "statistic",
            "p_value",
            "significance",
            "cost_effective",
        ],
    )
    .with_row(vec![
        result.clients.into(),
        result.mean_completion.into(),
        result.threshold.into(),
        result.observed_increase.into(),
        result.outcome.statistic.into(),
        result.outcome.p_value.into(),
        result.outcome.significance.as_str().into(),
        result.cost_effective.into(),
    ]);
    debug!(cost_effective = result.cost_effective, "Rendered cost effectiveness");
    sink.table(&table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonSink;
    use crate::text::TextSink;
    use analysis::{run_pipeline, AnalysisConfig};
    use dataset::read_demographics;
    use dataset::{read_assignments, read_web_events, DataQualityReport, RawSources};

    fn output() -> PipelineOutput {
        let demo = "\
client_id,clnt_tenure_yr,clnt_tenure_mnth,clnt_age,gendr,num_accts,bal,calls_6_mnth,logons_6_mnth
1,6.0,73.0,60.5,U,2.0,45105.3,6.0,9.0
2,7.0,94.0,58.0,F,2.0,110860.3,6.0,9.0
3,1.0,5.0,32.0,M,2.0,52467.79,6.0,9.0
";
        let web = "\
client_id,visit_visitor_id,visit_id,process_step,date_time
1,a,v1,start,2017-04-17 15:00:00
1,a,v1,step_1,2017-04-17 15:00:20
1,a,v1,confirm,2017-04-17 15:01:00
2,b,v2,start,2017-04-17 15:00:00
2,b,v2,step_1,2017-04-17 15:00:10
2,b,v2,start,2017-04-17 15:00:40
3,c,v3,start,2017-04-17 16:00:00
3,c,v3,confirm,2017-04-17 16:02:00
";
        let experiment = "client_id,Variation\n1,Test\n2,Control\n3,Control\n";

        let mut quality = DataQualityReport::new();
        let demographics = read_demographics("demo", demo.as_bytes(), b',', &mut quality).unwrap();
        let web_events = read_web_events("web", web.as_bytes(), b',', &mut quality).unwrap();
        let assignments = read_assignments("experiment", experiment.as_bytes(), b',', &mut quality).unwrap();
        let sources = RawSources {
            demographics,
            web_events,
            assignments,
            quality,
        };
        run_pipeline(sources, &AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_text_report_has_every_section() {
        let mut sink = TextSink::new(Vec::new());
        render_report(&output(), &mut sink).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        for section in [
            "Data quality",
            "Client base",
            "Demographics",
            "Completion",
            "Step durations",
            "Session duration",
            "Error rates",
            "Cost effectiveness",
        ] {
            assert!(text.contains(&format!("== {} ==", section)), "missing {}", section);
        }
        assert!(text.contains("[pie figure] Gender distribution, Control"));
    }

    #[test]
    fn test_json_report_structure() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonSink::new(dir.path().join("report.json"));
        render_report(&output(), &mut sink).unwrap();

        let document = sink.document();
        assert_eq!(document.sections.len(), 8);

        let client_base = &document.sections[1];
        assert_eq!(client_base.title, "Client base");
        let balance = &client_base.tables[0];
        assert_eq!(balance.rows[0][0], Cell::Integer(3));
        assert_eq!(balance.rows[0][7], Cell::Float(110860.3));
        let accounts = &client_base.tables[1];
        assert_eq!(accounts.rows, vec![vec![Cell::Float(2.0), Cell::Integer(3)]]);

        let completion = &document.sections[3];
        let rates = &completion.tables[0];
        assert_eq!(rates.rows.len(), 2);
        assert_eq!(rates.rows[0][3], Cell::Float(50.0));

        let steps = &document.sections[4].tables[1];
        assert_eq!(steps.rows.len(), 5);
        // A single-observation step cannot be tested
        assert_eq!(steps.rows[4][5], Cell::Text("undetermined".into()));
        assert!(sink.path().exists());
    }
}
