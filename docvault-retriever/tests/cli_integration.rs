use anyhow::Result;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run the CLI binary against a store in `temp_dir`
fn run_cli(temp_dir: &TempDir, args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_docvault"))
        .arg("--data-dir")
        .arg(temp_dir.path().join("store"))
        .arg("--dimension")
        .arg("64")
        .args(args)
        .env("RUST_LOG", "error") // Reduce log noise
        .output()?;
    Ok(output)
}

fn write_file(dir: &Path, name: &str, content: &str) -> Result<String> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path.to_string_lossy().into_owned())
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_cli_add_search_stats_clear() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let brief = write_file(
        temp_dir.path(),
        "brief.txt",
        "Server uptime is 99.8%. Budget utilization is 92%.",
    )?;

    let output = run_cli(&temp_dir, &["add", &brief])?;
    assert!(output.status.success(), "add failed: {output:?}");
    assert!(stdout(&output).contains("Added brief.txt"));

    let output = run_cli(&temp_dir, &["search", "uptime", "-k", "1", "--format", "json"])?;
    assert!(output.status.success());
    let results: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(results.as_array().map(Vec::len), Some(1));
    assert_eq!(results[0]["chunk"]["source_filename"], "brief.txt");
    assert_eq!(results[0]["rank"], 1);

    let output = run_cli(&temp_dir, &["stats", "--format", "json"])?;
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stats["unique_source_files"], 1);
    assert_eq!(stats["is_trained"], true);
    assert_eq!(stats["dimension"], 64);

    let output = run_cli(&temp_dir, &["clear"])?;
    assert!(output.status.success());

    let output = run_cli(&temp_dir, &["stats", "--format", "json"])?;
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stats["total_chunks"], 0);
    assert_eq!(stats["is_trained"], false);
    Ok(())
}

#[test]
fn test_cli_context() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let notes = write_file(temp_dir.path(), "notes.md", "Three incidents were resolved.")?;

    let output = run_cli(&temp_dir, &["context", "incidents"])?;
    assert!(output.status.success());
    assert!(stdout(&output).contains("No relevant documents found."));

    run_cli(&temp_dir, &["add", &notes])?;
    let output = run_cli(&temp_dir, &["context", "incidents", "--max-chars", "5"])?;
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.starts_with("Relevant document excerpts:"));
    assert!(text.contains("From notes.md: Three..."));
    Ok(())
}

#[test]
fn test_cli_skips_unsupported_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pdf = write_file(temp_dir.path(), "report.pdf", "%PDF-1.7")?;

    let output = run_cli(&temp_dir, &["add", &pdf, "--format", "json"])?;
    assert!(output.status.success());
    let added: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(added.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn test_cli_invalid_format() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = run_cli(&temp_dir, &["stats", "--format", "xml"])?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn test_cli_invalid_chunk_config() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = write_file(
        temp_dir.path(),
        "docvault.toml",
        "chunk_size = 100\nchunk_overlap = 100\n",
    )?;

    let output = run_cli(&temp_dir, &["--config", &config, "stats"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error:"));
    Ok(())
}
