use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cqa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cqa");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Seed the qb agent with a document-only index (no embeddings file):
    // meta-questions and stats must work from the document list alone.
    let qb_dir = root.join("data").join("qb");
    fs::create_dir_all(&qb_dir).unwrap();
    fs::write(
        qb_dir.join("documents.json"),
        r#"[
            {"url":"https://www.ufpb.br/docs/edital-monitoria.pdf","content":"Edital de monitoria 2024. Inscrições até 10/10."},
            {"url":"https://www.ufpb.br/noticias/resultado","content":"Resultado preliminar divulgado."}
        ]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[retrieval]
k = 8
threshold = 0.4

[[agents]]
name = "qb"
data_dir = "{}/data/qb"
default = true

[[agents]]
name = "menu"
data_dir = "{}/data/menu"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("cqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_agents_lists_configured_agents() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cqa(&config_path, &["agents"]);
    assert!(success, "agents failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("qb (default)"));
    assert!(stdout.contains("menu"));
}

#[test]
fn test_stats_counts_documents() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cqa(&config_path, &["stats", "--agent", "qb"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    let squashed: String = stdout.split_whitespace().collect::<Vec<_>>().join(" ");
    assert!(squashed.contains("Documents: 2"));
    assert!(squashed.contains("PDFs: 1 / 2"));
    // Document-only index: nothing embedded yet.
    assert!(squashed.contains("0 rows"));
}

#[test]
fn test_stats_empty_agent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_cqa(&config_path, &["stats", "--agent", "menu"]);
    assert!(success);
    let squashed: String = stdout.split_whitespace().collect::<Vec<_>>().join(" ");
    assert!(squashed.contains("Documents: 0"));
}

#[test]
fn test_ask_meta_count_is_answered_offline() {
    let (_tmp, config_path) = setup_test_env();

    // Meta-questions are answered from index metadata: no embedding or
    // generation credentials are available in this environment.
    let (stdout, stderr, success) =
        run_cqa(&config_path, &["ask", "quantos documentos vocês têm?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 documentos"));
}

#[test]
fn test_ask_meta_count_scoped_to_pdf() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_cqa(&config_path, &["ask", "quantos pdfs estão indexados?"]);
    assert!(success);
    assert!(stdout.contains("1 PDF"));
}

#[test]
fn test_ask_meta_list_scoped_to_pdf() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_cqa(&config_path, &["ask", "quais pdfs estão indexados?"]);
    assert!(success);
    assert!(stdout.contains("edital-monitoria.pdf"));
    assert!(!stdout.contains("noticias/resultado"));
}

#[test]
fn test_unknown_agent_falls_back_to_default() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_cqa(
        &config_path,
        &["ask", "quantos documentos vocês têm?", "--agent", "nope"],
    );
    assert!(success);
    assert!(stdout.contains("2 documentos"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("cqa.toml");
    fs::write(
        &config_path,
        r#"[retrieval]
k = 0

[[agents]]
name = "qb"
data_dir = "data/qb"
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_cqa(&config_path, &["agents"]);
    assert!(!success);
    assert!(stderr.contains("retrieval.k"));
}

#[test]
fn test_missing_config_file_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("does-not-exist.toml");
    let (_, stderr, success) = run_cqa(&config_path, &["agents"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
