//! Runs the `pdfp` binary end to end.

mod common;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use axum::{routing::post, Json, Router};
use common::pdf_with_pages;
use serde_json::json;
use tempfile::TempDir;

fn pdfp_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdfp"))
}

/// Writes a config pointing at `endpoint` plus a two-page PDF.
fn setup_test_env(endpoint: &str) -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_path = root.join("pdfp.toml");
    fs::write(
        &config_path,
        format!(
            r#"[completion]
endpoint = "{}"
model = "test/model"
api_key_env = ""
timeout_secs = 5

[prompts]
language = "Roman Urdu"
"#,
            endpoint
        ),
    )
    .unwrap();

    let pdf_path = root.join("report.pdf");
    fs::write(&pdf_path, pdf_with_pages(&["Hello world", "Goodbye"])).unwrap();

    (tmp, config_path, pdf_path)
}

fn run_pdfp(config_path: &Path, args: &[&str], stdin: Option<&str>) -> (String, String, bool) {
    let binary = pdfp_binary();
    let mut child = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .arg("--progress")
        .arg("off")
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to run pdfp binary at {:?}: {}", binary, e));

    {
        let mut handle = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            handle.write_all(input.as_bytes()).unwrap();
        }
    }

    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Stub backend that always replies with `reply`; runs on its own runtime
/// thread so the blocking binary calls below can reach it.
fn spawn_stub(reply: &'static str) -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let app = Router::new().route(
                "/v1/chat/completions",
                post(move || async move {
                    Json(json!({ "choices": [{ "message": { "content": reply } }] }))
                }),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    let addr = rx.recv().unwrap();
    format!("http://{}/v1/chat/completions", addr)
}

#[test]
fn extract_prints_page_text() {
    let (_tmp, config, pdf) = setup_test_env("http://127.0.0.1:9/v1/chat/completions");
    let (stdout, stderr, success) = run_pdfp(&config, &["extract", pdf.to_str().unwrap()], None);
    assert!(success, "extract failed: {}", stderr);
    assert_eq!(stdout, "Hello world\n\nGoodbye\n\n");
}

#[test]
fn extract_rejects_non_pdf() {
    let (tmp, config, _pdf) = setup_test_env("http://127.0.0.1:9/v1/chat/completions");
    let notes = tmp.path().join("notes.txt");
    fs::write(&notes, "just text").unwrap();

    let (stdout, stderr, success) = run_pdfp(&config, &["extract", notes.to_str().unwrap()], None);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("unsupported document type"), "stderr: {}", stderr);
}

#[test]
fn stages_lists_every_displayed_stage() {
    let (_tmp, config, _pdf) = setup_test_env("http://127.0.0.1:9/v1/chat/completions");
    let (stdout, _, success) = run_pdfp(&config, &["stages"], None);
    assert!(success);
    assert_eq!(stdout.lines().count(), 5);
    assert!(stdout.contains("Extracting Text"));
    assert!(stdout.contains("Creating a concise summary in Roman Urdu..."));
    assert!(stdout.contains("Processing Failed"));
}

#[test]
fn summarize_prints_title_and_artifact() {
    let endpoint = spawn_stub("• point one\n• point two");
    let (_tmp, config, pdf) = setup_test_env(&endpoint);

    let (stdout, stderr, success) =
        run_pdfp(&config, &["summarize", pdf.to_str().unwrap()], None);
    assert!(success, "summarize failed: {}", stderr);
    assert!(stdout.starts_with("Summary in Roman Urdu\n"));
    assert!(stdout.contains("• point one\n• point two"));
}

#[test]
fn chat_answers_each_line_until_quit() {
    let endpoint = spawn_stub("It says hello.");
    let (_tmp, config, pdf) = setup_test_env(&endpoint);

    let (stdout, stderr, success) = run_pdfp(
        &config,
        &["chat", pdf.to_str().unwrap()],
        Some("What does it say?\n/quit\nignored\n"),
    );
    assert!(success, "chat failed: {}", stderr);
    assert!(stdout.starts_with("Hello! I can answer questions"));
    assert_eq!(stdout.matches("It says hello.").count(), 1);
}

#[test]
fn unreachable_backend_fails_summarize() {
    let (_tmp, config, pdf) = setup_test_env("http://127.0.0.1:9/v1/chat/completions");
    let (stdout, _, success) = run_pdfp(&config, &["summarize", pdf.to_str().unwrap()], None);
    assert!(!success);
    assert!(stdout.is_empty());
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[completion]\ncontext_chars = 0\n").unwrap();

    let (_, stderr, success) = run_pdfp(&config, &["stages"], None);
    assert!(!success);
    assert!(stderr.contains("context_chars"), "stderr: {}", stderr);
}
