use regex::Regex;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct TestContext {
    _dir: TempDir,
    tm_path: PathBuf,
    input_path: PathBuf,
    dir_path: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let tm_path = dir.path().join("tm.tsv");
        let input_path = dir.path().join("input.txt");

        let mut tm = File::create(&tm_path).unwrap();
        writeln!(tm, "# source\ttarget\tp").unwrap();
        writeln!(tm, "a\tX\t0.37").unwrap();
        writeln!(tm, "b\tY\t0.37").unwrap();
        writeln!(tm, "c\tZ\t0.37").unwrap();
        writeln!(tm, "a b\tXY\t0.22").unwrap();

        let mut input = File::create(&input_path).unwrap();
        writeln!(input, "a b c").unwrap();
        writeln!(input, "c q").unwrap();

        Self {
            dir_path: dir.path().to_path_buf(),
            _dir: dir,
            tm_path,
            input_path,
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_beamforge"))
            .arg("--phrase-table")
            .arg(&self.tm_path)
            .args(args)
            .output()
            .expect("Failed to execute binary")
    }
}

#[test]
fn test_cli_decode_plain() {
    let ctx = TestContext::new();
    let output = ctx.run(&["decode", "--input", ctx.input_path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["XY Z", "Z q"]);
}

#[test]
fn test_cli_decode_json() {
    let ctx = TestContext::new();
    let output = ctx.run(&[
        "decode",
        "--json",
        "--n-best-size",
        "3",
        "--input",
        ctx.input_path.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(first["input"], "a b c");
    assert_eq!(first["output"], "XY Z");
    assert_eq!(first["nBest"].as_array().unwrap().len(), 3);
    assert_eq!(first["stats"]["sentence_len"], 3);
}

#[test]
fn test_cli_config_file_and_override() {
    let ctx = TestContext::new();
    let config_path = ctx.dir_path.join("config.json");
    let mut f = File::create(&config_path).unwrap();
    writeln!(f, r#"{{ "search": {{ "n_best_size": 2 }}, "weights": {{ "weight_w": 1.0 }} }}"#).unwrap();

    // A huge word bonus makes the two-word output win
    let output = ctx.run(&[
        "--config",
        config_path.to_str().unwrap(),
        "decode",
        "--json",
        "--weight-w=-5",
        "--input",
        ctx.input_path.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(first["output"], "X Y Z");
    assert_eq!(first["nBest"].as_array().unwrap().len(), 2);
}

#[test]
fn test_cli_n_best_table() {
    let ctx = TestContext::new();
    let output = ctx.run(&[
        "decode",
        "--n-best-size",
        "2",
        "--input",
        ctx.input_path.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    let row = Regex::new(r"(?m)^\|\s*(\d+)\s*\|\s*([^|]+?)\s*\|\s*(-?\d+\.\d+)\s*\|").unwrap();
    let ranked: Vec<(String, f32)> = row
        .captures_iter(&stdout)
        .map(|c| (c[2].to_string(), c[3].parse().unwrap()))
        .collect();
    assert!(ranked.len() >= 2, "{}", stdout);
    assert_eq!(ranked[0].0, "XY Z");
    assert_eq!(ranked[1].0, "X Y Z");
    assert!(ranked[0].1 > ranked[1].1);
}

#[test]
fn test_cli_stats_table() {
    let ctx = TestContext::new();
    let output = ctx.run(&["decode", "--stats", "--input", ctx.input_path.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("recombined"));
    assert!(stdout.contains("not completable"));
}

#[test]
fn test_cli_inspect() {
    let ctx = TestContext::new();
    let output = ctx.run(&["inspect", "--sentence", "a b c"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[0..1]"));
    assert!(stdout.contains("XY"));
    assert!(stdout.contains("start \\ end"));
}

#[test]
fn test_cli_missing_table_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_beamforge"))
        .args(["--phrase-table", "/nonexistent/tm.tsv", "decode"])
        .output()
        .expect("Failed to execute binary");
    assert!(!output.status.success());
}

#[test]
fn test_cli_rejects_positive_beam() {
    let ctx = TestContext::new();
    let output = ctx.run(&[
        "decode",
        "--beam-threshold",
        "3",
        "--input",
        ctx.input_path.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
}
