mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{Command, Stdio};
use test_support::{request_ok, temp_dir};

#[test]
fn workspace_flag_opens_database_at_startup() {
    let workspace = temp_dir("bulletind-cli-workspace");
    let mut child = Command::new(env!("CARGO_BIN_EXE_bulletind"))
        .arg("--workspace")
        .arg(&workspace)
        .arg("--log")
        .arg("bulletind=debug")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn bulletind");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    let expected = workspace.to_string_lossy().to_string();
    assert_eq!(health["workspacePath"].as_str(), Some(expected.as_str()));
    let listed = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(listed["students"], json!([]));
    assert!(workspace.join("bulletind.sqlite3").exists());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
