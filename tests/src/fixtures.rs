//! Test fixtures and source-file generators.

use chrono::{Duration, NaiveDate, NaiveDateTime};

pub const DEMOGRAPHICS_HEADER: &str =
    "client_id,clnt_tenure_yr,clnt_tenure_mnth,clnt_age,gendr,num_accts,bal,calls_6_mnth,logons_6_mnth";
pub const WEB_HEADER: &str = "client_id,visit_visitor_id,visit_id,process_step,date_time";
pub const EXPERIMENT_HEADER: &str = "client_id,Variation";

/// Midnight of the first experiment day.
pub fn day_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2017, 4, 3)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// A demographics line with plausible values; `age` and `bal` may be blank.
pub fn demographic_line(client_id: &str, age: Option<f64>, gender: &str) -> String {
    let age = age.map(|a| format!("{:.1}", a)).unwrap_or_default();
    format!("{client_id},6.0,73.0,{age},{gender},2.0,45105.3,6.0,9.0")
}

/// Demographics lines for clients `0..n` with ages cycling through 25..75.
pub fn demographic_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let gender = ["M", "F", "U"][i % 3];
            demographic_line(&i.to_string(), Some(25.0 + (i % 50) as f64), gender)
        })
        .collect()
}

/// Web-log lines for one visit: `(step, seconds after the visit start)`.
pub fn visit_lines(client_id: &str, visit_id: &str, start: NaiveDateTime, steps: &[(&str, i64)]) -> Vec<String> {
    steps
        .iter()
        .map(|(step, offset)| {
            let ts = start + Duration::seconds(*offset);
            format!(
                "{client_id},{client_id}_visitor,{visit_id},{step},{}",
                ts.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect()
}

/// A full start → confirm visit with fixed gaps.
pub fn completed_visit(client_id: &str, visit_id: &str, start: NaiveDateTime) -> Vec<String> {
    visit_lines(
        client_id,
        visit_id,
        start,
        &[("start", 0), ("step_1", 15), ("step_2", 45), ("step_3", 90), ("confirm", 150)],
    )
}

/// A visit that stops at step_2 after going back once.
pub fn abandoned_visit(client_id: &str, visit_id: &str, start: NaiveDateTime) -> Vec<String> {
    visit_lines(
        client_id,
        visit_id,
        start,
        &[("start", 0), ("step_1", 20), ("start", 35), ("step_1", 50), ("step_2", 80)],
    )
}

/// Assignment lines; `None` leaves the Variation cell blank.
pub fn assignment_lines(assignments: &[(&str, Option<&str>)]) -> Vec<String> {
    assignments
        .iter()
        .map(|(client, variation)| format!("{client},{}", variation.unwrap_or("")))
        .collect()
}

/// Joins a header and lines into file contents.
pub fn csv_file(header: &str, lines: &[String]) -> String {
    let mut out = String::with_capacity(header.len() + lines.iter().map(|l| l.len() + 1).sum::<usize>() + 1);
    out.push_str(header);
    out.push('\n');
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Contents of the four source files of one run.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    pub demographics: Vec<String>,
    /// Lines of the first web-log partition
    pub web_pt_1: Vec<String>,
    /// Lines of the second web-log partition
    pub web_pt_2: Vec<String>,
    pub experiment: Vec<String>,
}

impl SourceFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small balanced experiment: 10 clients per group, the test group
    /// completes more often and backtracks less.
    pub fn balanced() -> Self {
        let mut files = Self::new();
        files.demographics = demographic_lines(20);

        let mut assignments = Vec::new();
        for i in 0..20 {
            let client = i.to_string();
            let visit = format!("visit_{i}");
            let start = day_start() + Duration::minutes(i as i64 * 10);
            let is_test = i % 2 == 1;
            let lines = if (is_test && i % 5 != 0) || (!is_test && i % 4 == 0) {
                completed_visit(&client, &visit, start)
            } else {
                abandoned_visit(&client, &visit, start)
            };
            if i < 10 {
                files.web_pt_1.extend(lines);
            } else {
                files.web_pt_2.extend(lines);
            }
            assignments.push(format!("{client},{}", if is_test { "Test" } else { "Control" }));
        }
        files.experiment = assignments;
        files
    }
}
