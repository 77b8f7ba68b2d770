/// Integration tests driving the CLI binary over stdin.
/// Tests cover: basic ops, flushes, compaction, range scans, gc, reset, recovery, bad input
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Helper to run CLI commands and capture output
fn run_cli_command(data_dir: &Path, page_size: usize, command: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("LSMKV_DIR", data_dir.to_str().unwrap())
        .env("LSMKV_PAGE_SIZE", page_size.to_string())
        .env("LSMKV_L0_TRIGGER", "2")
        .env("LSMKV_SYNC", "false")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().expect("Failed to open stdin");
        stdin
            .write_all(command.as_bytes())
            .expect("Failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("Failed to write EXIT");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Default page size.
const PAGE: usize = 16384;
/// Header + bloom filter + four entries.
const SMALL_PAGE: usize = 8224 + 4 * 20;

fn sst_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("level-"))
        .flat_map(|e| fs::read_dir(e.path()).unwrap().filter_map(|f| f.ok()))
        .filter(|e| e.file_name().to_string_lossy().ends_with(".sst"))
        .count()
}

#[test]
fn test_basic_put_get() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), PAGE, "PUT 1 value1\nGET 1\n");

    assert!(output.contains("OK"));
    assert!(output.contains("value1"));
}

#[test]
fn test_value_with_spaces() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), PAGE, "PUT 5 hello big world\nGET 5\n");
    assert!(output.contains("hello big world"));
}

#[test]
fn test_overwrite_and_delete() {
    let dir = tempdir().unwrap();
    let commands = "PUT 9 old\nPUT 9 new\nGET 9\nDEL 9\nGET 9\nDEL 9\n";
    let output = run_cli_command(dir.path(), PAGE, commands);

    assert!(output.contains("new"));
    assert!(!output.contains("old\n"));
    assert!(output.contains("(nil)"));
    assert!(output.contains("(not found)"));
}

#[test]
fn test_range_scan() {
    let dir = tempdir().unwrap();
    let commands = "PUT 1 a\nPUT 2 b\nPUT 3 c\nPUT 10 z\nDEL 2\nSCAN 1 3\n";
    let output = run_cli_command(dir.path(), PAGE, commands);

    assert!(output.contains("1 -> a"));
    assert!(!output.contains("2 -> b"));
    assert!(output.contains("3 -> c"));
    assert!(!output.contains("10 -> z"));
    assert!(output.contains("(2 entries)"));
}

#[test]
fn test_flush_writes_level_zero_run() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), PAGE, "PUT 10 a\nPUT 20 b\nFLUSH\n");

    assert!(output.contains("OK (L0=1)"));
    assert!(dir.path().join("level-0").join("sst-10-20-1.sst").exists());
}

#[test]
fn test_compaction_moves_runs_down() {
    let dir = tempdir().unwrap();
    let mut commands = String::new();
    for k in 0..13 {
        commands.push_str(&format!("PUT {} v{}\n", k, k));
    }
    commands.push_str("GET 0\nGET 12\n");
    let output = run_cli_command(dir.path(), SMALL_PAGE, &commands);

    assert!(output.contains("v0"));
    assert!(output.contains("v12"));
    assert!(dir.path().join("level-1").exists());
    // Three level-0 runs of four merged into level 1; the 13th key is
    // flushed on exit.
    assert_eq!(sst_files(dir.path()), 4);
}

#[test]
fn test_gc_keeps_live_values() {
    let dir = tempdir().unwrap();
    let commands = "PUT 1 first\nFLUSH\nPUT 1 second\nPUT 2 other\nFLUSH\nGC 1000000\nGET 1\nGET 2\n";
    let output = run_cli_command(dir.path(), PAGE, commands);

    assert!(output.contains("relocated"));
    assert!(output.contains("second"));
    assert!(output.contains("other"));
}

#[test]
fn test_reset_drops_everything() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), PAGE, "PUT 1 a\nFLUSH\nRESET\nGET 1\n");

    assert!(output.contains("(nil)"));
    assert!(!dir.path().join("level-0").exists());
}

#[test]
fn test_invalid_input() {
    let dir = tempdir().unwrap();
    let commands = "PUT abc v\nPUT 1\nGET\nSCAN 5\nFROB\n";
    let output = run_cli_command(dir.path(), PAGE, commands);

    assert!(output.contains("ERR invalid key \"abc\""));
    assert!(output.contains("ERR usage: PUT key value"));
    assert!(output.contains("ERR missing key"));
    assert!(output.contains("unknown command: FROB"));
    assert!(output.contains("bye"));
}

#[test]
fn test_stats_output() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), PAGE, "PUT 1 a\nSTATS\n");
    assert!(output.contains("Engine"));
    assert!(output.contains("memtable_entries: 1"));
}

#[test]
fn test_persistence_across_restarts() {
    let dir = tempdir().unwrap();
    run_cli_command(dir.path(), PAGE, "PUT 42 persistent\n");
    let output = run_cli_command(dir.path(), PAGE, "GET 42\n");
    assert!(output.contains("persistent"));
}

#[test]
fn test_bench_reports_throughput() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), PAGE, "BENCH 200\nGET 1\nGET 2\n");

    for phase in ["PUT:", "GET:", "SCAN:", "DEL:"] {
        assert!(output.contains(phase), "missing {}", phase);
    }
    assert!(output.contains("SCAN returned 100 entries"));
    // Even keys were deleted.
    assert!(output.contains(&"s".repeat(2)));
    assert!(output.contains("(nil)"));
}
