//! Job-table parsing.
//!
//! One job per line:
//!
//! ```text
//! # minute hour day-of-month month day-of-week name command...
//! */15     *    *            *     *           sync  /usr/local/bin/sync --quiet
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. The command is kept
//! verbatim, internal whitespace included. Any error rejects the whole table.

use std::collections::HashMap;

use crate::{
    error::{Result, SchedulerError},
    schedule::ScheduleExpression,
    types::Job,
};

/// Parse the job table `text` read from `table` (used in error messages).
pub fn parse_jobs(table: &str, text: &str) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let job = parse_line(table, line, trimmed)?;
        if let Some(&first_line) = seen.get(&job.name) {
            return Err(SchedulerError::DuplicateJob {
                table: table.to_string(),
                line,
                name: job.name,
                first_line,
            });
        }
        seen.insert(job.name.clone(), line);
        jobs.push(job);
    }

    Ok(jobs)
}

fn parse_line(table: &str, line: usize, text: &str) -> Result<Job> {
    let err = |field: &'static str, token: &str, reason: &str| SchedulerError::Parse {
        table: table.to_string(),
        line,
        field,
        token: token.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = text;
    let mut fields = [""; 5];
    for (i, slot) in fields.iter_mut().enumerate() {
        let (token, tail) = next_token(rest)
            .ok_or_else(|| err("schedule", text, &format!("expected 5 schedule fields, found {i}")))?;
        *slot = token;
        rest = tail;
    }

    let schedule = ScheduleExpression::from_fields(fields)
        .map_err(|e| err(e.field.label(), &e.token, &e.reason))?;

    let (name, rest) = next_token(rest).ok_or_else(|| err("job name", "", "missing job name"))?;
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(err(
            "job name",
            name,
            &format!("character {bad:?} is not allowed"),
        ));
    }

    let command = rest.trim();
    if command.is_empty() {
        return Err(err("command", "", "missing command"));
    }

    Ok(Job {
        name: name.to_string(),
        schedule,
        command: command.to_string(),
        line,
    })
}

/// Split off the first whitespace-delimited token; the remainder keeps its
/// internal whitespace.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(end) => Some((&s[..end], &s[end..])),
        None => Some((s, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Field;

    const TABLE: &str = "\
# nightly maintenance
0 3 * * *   backup   /usr/bin/backup --full   /srv

*/15 * * * * poll  curl -s http://localhost/ping
   # indented comment
30 9 1 * mon report /opt/report.sh
";

    #[test]
    fn parses_jobs_in_order() {
        let jobs = parse_jobs("/etc/cdcron", TABLE).unwrap();
        let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["backup", "poll", "report"]);
        assert_eq!(jobs[0].line, 2);
        assert_eq!(jobs[1].line, 4);
        assert_eq!(jobs[2].line, 6);
    }

    #[test]
    fn command_keeps_internal_whitespace() {
        let jobs = parse_jobs("t", TABLE).unwrap();
        assert_eq!(jobs[0].command, "/usr/bin/backup --full   /srv");
        assert_eq!(jobs[0].argv(), vec!["/usr/bin/backup", "--full", "/srv"]);
    }

    #[test]
    fn schedule_fields_are_parsed() {
        let jobs = parse_jobs("t", TABLE).unwrap();
        let minutes: Vec<u32> = jobs[1].schedule.field(Field::Minute).values().collect();
        assert_eq!(minutes, vec![0, 15, 30, 45]);
        let dow: Vec<u32> = jobs[2].schedule.field(Field::DayOfWeek).values().collect();
        assert_eq!(dow, vec![1]);
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse_jobs("t", TABLE).unwrap(), parse_jobs("t", TABLE).unwrap());
    }

    #[test]
    fn empty_table_is_valid() {
        assert!(parse_jobs("t", "\n# nothing\n\n").unwrap().is_empty());
    }

    #[test]
    fn bad_field_names_line_and_field() {
        let text = "* * * * * ok true\n61 * * * * broken true\n";
        let err = parse_jobs("/etc/cdcron", text).unwrap_err();
        match &err {
            SchedulerError::Parse {
                table, line, field, token, ..
            } => {
                assert_eq!(table, "/etc/cdcron");
                assert_eq!(*line, 2);
                assert_eq!(*field, "minute");
                assert_eq!(token, "61");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("/etc/cdcron:2: invalid minute"));
    }

    #[test]
    fn bad_day_of_week_is_reported() {
        let err = parse_jobs("t", "0 0 * * 1-9 weekly true").unwrap_err();
        assert!(matches!(err, SchedulerError::Parse { field: "day-of-week", .. }));
    }

    #[test]
    fn too_few_fields() {
        let err = parse_jobs("t", "* * *").unwrap_err();
        assert!(matches!(err, SchedulerError::Parse { field: "schedule", line: 1, .. }));
    }

    #[test]
    fn missing_name_or_command() {
        let err = parse_jobs("t", "* * * * *").unwrap_err();
        assert!(matches!(err, SchedulerError::Parse { field: "job name", .. }));
        let err = parse_jobs("t", "* * * * * lonely").unwrap_err();
        assert!(matches!(err, SchedulerError::Parse { field: "command", .. }));
    }

    #[test]
    fn invalid_name_characters() {
        let err = parse_jobs("t", "* * * * * bad/name true").unwrap_err();
        assert!(matches!(err, SchedulerError::Parse { field: "job name", .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let text = "* * * * * dup true\n\n0 * * * * dup false\n";
        let err = parse_jobs("t", text).unwrap_err();
        match err {
            SchedulerError::DuplicateJob {
                line, first_line, name, ..
            } => {
                assert_eq!(name, "dup");
                assert_eq!(line, 3);
                assert_eq!(first_line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn later_error_rejects_whole_table() {
        let text = "* * * * * a true\n* * * * * b true\n* 25 * * * c true\n";
        assert!(parse_jobs("t", text).is_err());
    }
}
