use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn inwatch(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_inwatch"))
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to run inwatch")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();

    let output = inwatch(temp_dir.path(), &["init"]);
    assert!(output.status.success());

    let config_path = temp_dir.path().join(".inwatch/settings.toml");
    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[listener]"));
    assert!(content.contains("[notify]"));

    // second init without --force refuses
    let output = inwatch(temp_dir.path(), &["init"]);
    assert!(!output.status.success());

    let output = inwatch(temp_dir.path(), &["init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn test_watch_list_and_remove() {
    let temp_dir = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let target_str = target.path().to_str().unwrap();
    inwatch(temp_dir.path(), &["init"]);

    let output = inwatch(
        temp_dir.path(),
        &[
            "watch",
            target_str,
            "--for",
            "create and delete",
            "--of",
            "files",
            "--dest",
            "#ops",
        ],
    );
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(temp_dir.path().join(".inwatch/watches.json").exists());

    let output = inwatch(temp_dir.path(), &["list", "--dest", "#ops"]);
    assert!(stdout(&output).contains(&format!("{target_str} (F:CD) (watched)")));

    let output = inwatch(temp_dir.path(), &["who-watches", target_str]);
    assert!(stdout(&output).contains("#ops"));

    let output = inwatch(temp_dir.path(), &["rm", target_str]);
    assert!(output.status.success());

    let output = inwatch(temp_dir.path(), &["list"]);
    assert!(stdout(&output).contains("No watches."));
}

#[test]
fn test_user_errors_exit_with_code_2() {
    let temp_dir = TempDir::new().unwrap();
    inwatch(temp_dir.path(), &["init"]);

    let output = inwatch(temp_dir.path(), &["watch", "/no/such/dir/anywhere"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no such file or directory"));

    let output = inwatch(
        temp_dir.path(),
        &["remove", temp_dir.path().to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_events_command() {
    let temp_dir = TempDir::new().unwrap();
    let output = inwatch(temp_dir.path(), &["events"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("create [C]"));
    assert!(text.contains("attribute (change) [A]"));
    assert!(text.contains("delete [D]"));
}
