//! Integration tests for trace log persistence across multiple files.

use std::collections::BTreeMap;

use trajectory::{
    AttemptRecord, CandidateRecord, IterationRecord, ProblemLog, RunStats, SolveMethod,
    StepRecord, TestOutcome, Trace, TraceReader, TraceWriter,
};

fn beam_log(problem: &str, solved: bool) -> ProblemLog {
    let step = StepRecord {
        step: 0,
        frontier: vec![String::new()],
        candidates: vec![
            CandidateRecord {
                text: "4 + 9 = 13 (left: 10 13 13)\n".to_string(),
                parent: 0,
                score: 3.0,
                duplicate_of: None,
                cached: false,
            },
            CandidateRecord {
                text: "4 + 9 = 13 (left: 10 13 13)\n".to_string(),
                parent: 0,
                score: 3.0,
                duplicate_of: Some(0),
                cached: true,
            },
        ],
        selected: vec![0],
        warnings: vec!["unparseable evaluation for candidate 1".to_string()],
    };
    ProblemLog {
        problem: problem.to_string(),
        input: "4 9 10 13".to_string(),
        method: SolveMethod::Bfs,
        outputs: vec![step.candidates[0].text.clone()],
        results: vec![if solved { TestOutcome::pass() } else { TestOutcome::fail() }],
        iterations: 0,
        error: None,
        trace: Trace::Steps(vec![step]),
        stats: RunStats {
            generate_calls: 1,
            evaluate_calls: 1,
            cache_hits: 1,
            cache_misses: 1,
            ..RunStats::default()
        },
        timestamp_ms: trajectory::now_ms(),
    }
}

fn refine_log(problem: &str) -> ProblemLog {
    let mut metrics = BTreeMap::new();
    metrics.insert("r_letter".to_string(), 0.4);
    ProblemLog {
        problem: problem.to_string(),
        input: "1 1 4 6".to_string(),
        method: SolveMethod::Refine,
        outputs: vec!["1*1*4*6".to_string()],
        results: vec![TestOutcome::pass()],
        iterations: 2,
        error: None,
        trace: Trace::Iterations(vec![
            IterationRecord {
                iteration: 0,
                attempts: vec![AttemptRecord {
                    text: "1+1+4+6".to_string(),
                    outcome: TestOutcome {
                        success: false,
                        metrics,
                    },
                }],
                num_successes: 0,
                summary: "1. 1+1+4+6 = 12".to_string(),
                refined_from: None,
                critique: Some("Try multiplying.".to_string()),
            },
            IterationRecord {
                iteration: 1,
                attempts: vec![AttemptRecord {
                    text: "1*1*4*6".to_string(),
                    outcome: TestOutcome::pass(),
                }],
                num_successes: 1,
                summary: "1. 1*1*4*6 = 24".to_string(),
                refined_from: Some("1+1+4+6".to_string()),
                critique: None,
            },
        ]),
        stats: RunStats {
            generate_calls: 3,
            critiques: 1,
            ..RunStats::default()
        },
        timestamp_ms: trajectory::now_ms(),
    }
}

#[test]
fn test_mixed_trace_kinds_roundtrip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("mixed.json");

    let mut writer = TraceWriter::new(path.clone());
    writer.record(beam_log("p0", true));
    writer.record(refine_log("p1"));
    writer.finish().unwrap();

    let logs = TraceReader::read_all(&path).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0], beam_log_with_ts(&logs[0]));
    match &logs[1].trace {
        Trace::Iterations(iters) => {
            assert_eq!(iters.len(), 2);
            assert_eq!(iters[0].critique.as_deref(), Some("Try multiplying."));
            assert!((iters[0].attempts[0].outcome.metrics["r_letter"] - 0.4).abs() < 1e-9);
            assert_eq!(iters[1].refined_from.as_deref(), Some("1+1+4+6"));
        }
        other => panic!("expected iterations trace, got {other:?}"),
    }
}

fn beam_log_with_ts(read_back: &ProblemLog) -> ProblemLog {
    let mut expected = beam_log("p0", true);
    expected.timestamp_ms = read_back.timestamp_ms;
    expected
}

#[test]
fn test_read_multiple_files() {
    let tmp = tempfile::TempDir::new().unwrap();
    let a = tmp.path().join("a.json");
    let b = tmp.path().join("b.json");

    let mut wa = TraceWriter::new(a.clone());
    wa.record(beam_log("p0", true));
    wa.record(beam_log("p1", false));
    wa.finish().unwrap();

    let mut wb = TraceWriter::new(b.clone());
    wb.record(refine_log("p2"));
    wb.finish().unwrap();

    let logs = TraceReader::read_multiple(&[a, b]).unwrap();
    let names: Vec<&str> = logs.iter().map(|l| l.problem.as_str()).collect();
    assert_eq!(names, vec!["p0", "p1", "p2"]);
}

#[test]
fn test_summary_from_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("run.json");

    let mut writer = TraceWriter::new(path.clone());
    writer.record(beam_log("p0", true));
    writer.record(beam_log("p1", false));
    let mut errored = beam_log("p2", false);
    errored.error = Some("Oracle error: rate limited".to_string());
    writer.record(errored);
    writer.record(refine_log("p3"));
    writer.finish().unwrap();

    let summary = TraceReader::read_summary(&path).unwrap();
    assert_eq!(summary.total_problems, 4);
    assert_eq!(summary.solved_problems, 2);
    assert_eq!(summary.errored_problems, 1);
    assert!((summary.any_accuracy - 0.5).abs() < 1e-9);
    assert_eq!(summary.total_steps, 3);
    assert_eq!(summary.total_iterations, 2);
}

#[test]
fn test_read_missing_file() {
    let result = TraceReader::read_all(std::path::Path::new("/nonexistent/trace.json"));
    assert!(result.is_err());
}
