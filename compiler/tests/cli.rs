// cli.rs — Command-line driver behaviour
//
// Runs the built `hgc` binary against the kernel fixtures and checks output
// kinds, switch sources, output placement and exit codes.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn hgc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_hgc"))
}

fn kernel_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/kernels")
        .join(name)
}

/// Fresh scratch directory for one test.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hgc-cli-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir)
        .unwrap_or_else(|e| panic!("cannot create {}: {}", dir.display(), e));
    dir
}

fn run(cmd: &mut Command) -> Output {
    cmd.output()
        .unwrap_or_else(|e| panic!("cannot run hgc: {}", e))
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ── Output kinds ─────────────────────────────────────────────────────────────

#[test]
fn dot_goes_to_stdout_by_default() {
    let out = run(hgc().arg(kernel_path("vadd.c")).args(["--top", "vadd"]));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("digraph {\n"));
    assert!(text.contains("label=\"External\""));
}

#[test]
fn ast_dump_stops_after_parsing() {
    // An unknown top is only caught by lowering.
    let out = run(hgc()
        .arg(kernel_path("calls.c"))
        .args(["--top", "nowhere", "--emit", "ast"]));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("TranslationUnit"));
    assert!(text.contains("\"square\""));
}

#[test]
fn summary_is_json() {
    let out = run(hgc()
        .arg(kernel_path("calls.c"))
        .args(["--top", "energy", "--emit", "summary", "--absorb-types"]));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let summary: serde_json::Value = match serde_json::from_str(&stdout(&out)) {
        Ok(v) => v,
        Err(e) => panic!("summary is not JSON: {}", e),
    };
    assert_eq!(summary["top"], "energy");
    assert_eq!(summary["switches"], serde_json::json!(["absorb_types"]));
    assert!(summary["nodes"].as_u64().unwrap_or(0) > 0);
    let functions = summary["functions"]
        .as_array()
        .unwrap_or_else(|| panic!("expected a functions array"));
    let names: Vec<&str> = functions.iter().filter_map(|f| f["name"].as_str()).collect();
    assert_eq!(names, vec!["energy", "square", "clamp"]);
}

// ── Switch sources ───────────────────────────────────────────────────────────

#[test]
fn flags_turn_switches_on() {
    let plain = run(hgc().arg(kernel_path("vadd.c")).args(["--top", "vadd"]));
    let typed = run(hgc()
        .arg(kernel_path("vadd.c"))
        .args(["--top", "vadd", "--absorb-types", "--add-bb-id"]));
    assert!(typed.status.success(), "stderr: {}", stderr(&typed));
    assert!(!stdout(&plain).contains("bbID="));
    assert!(stdout(&typed).contains("bbID="));
    assert!(stdout(&typed).contains("datatype=\"int\""));
}

#[test]
fn config_file_and_flags_merge() {
    let dir = scratch("config");
    let config = dir.join("switches.json");
    std::fs::write(&config, r#"{ "add_func_id": true }"#)
        .unwrap_or_else(|e| panic!("cannot write config: {}", e));
    let out = run(hgc()
        .arg(kernel_path("vadd.c"))
        .args(["--top", "vadd", "--add-bb-id", "--config"])
        .arg(&config));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("funcID=\"0\""));
    assert!(text.contains("bbID="));
}

#[test]
fn unknown_config_key_is_an_io_error() {
    let dir = scratch("bad-config");
    let config = dir.join("switches.json");
    std::fs::write(&config, r#"{ "absorb_typos": true }"#)
        .unwrap_or_else(|e| panic!("cannot write config: {}", e));
    let out = run(hgc()
        .arg(kernel_path("vadd.c"))
        .args(["--top", "vadd", "--config"])
        .arg(&config));
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("switches.json"));
}

// ── Output placement ─────────────────────────────────────────────────────────

#[test]
fn output_flag_writes_file() {
    let dir = scratch("output");
    let target = dir.join("nested").join("graph.dot");
    let out = run(hgc()
        .arg(kernel_path("matmul.c"))
        .args(["--top", "matmul", "-o"])
        .arg(&target));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).is_empty());
    let written = std::fs::read_to_string(&target)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", target.display(), e));
    assert!(written.starts_with("digraph {\n"));
}

#[test]
fn make_dot_writes_under_outputs() {
    let dir = scratch("make-dot");
    let out = run(hgc()
        .current_dir(&dir)
        .arg(kernel_path("vadd.c"))
        .args(["--top", "vadd", "--make-dot"]));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(dir.join("outputs").join("vadd.dot").is_file());
}

#[test]
fn make_pdf_points_at_graphviz() {
    let dir = scratch("make-pdf");
    let out = run(hgc()
        .current_dir(&dir)
        .arg(kernel_path("vadd.c"))
        .args(["--top", "vadd", "--make-pdf"]));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(dir.join("outputs").join("vadd.dot").is_file());
    assert!(stderr(&out).contains("dot -Tpdf"));
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[test]
fn unknown_top_exits_one() {
    let out = run(hgc().arg(kernel_path("vadd.c")).args(["--top", "main"]));
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("main"), "stderr: {}", err);
    assert!(err.contains("lower failed"), "stderr: {}", err);
    assert!(stdout(&out).is_empty());
}

#[test]
fn unsupported_construct_exits_one() {
    let dir = scratch("do-while");
    let source = dir.join("loop.c");
    std::fs::write(&source, "void k() { int i = 0; do { i++; } while (i < 4); }\n")
        .unwrap_or_else(|e| panic!("cannot write source: {}", e));
    let out = run(hgc().arg(&source).args(["--top", "k"]));
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn missing_source_exits_two() {
    let out = run(hgc()
        .arg(kernel_path("does_not_exist.c"))
        .args(["--top", "k"]));
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("does_not_exist.c"));
}
