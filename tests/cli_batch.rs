use assert_cmd::Command;
use speedread::session::SessionTracker;
use speedread::store::SqliteStore;
use tempfile::tempdir;

fn speedread(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("speedread").unwrap();
    // keep config and log files out of the real home directory
    cmd.env("HOME", home).env("XDG_CONFIG_HOME", home.join(".config"));
    cmd
}

#[test]
fn stats_on_empty_database() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("sessions.db");

    let out = speedread(dir.path())
        .arg("--stats")
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();

    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("Sessions:    0"), "{stdout}");
    assert!(stdout.contains("Quiz score:  0%"), "{stdout}");
}

#[test]
fn stats_and_export_with_history() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("sessions.db");
    let csv_path = dir.path().join("history.csv");

    {
        let mut tracker = SessionTracker::new(SqliteStore::open(&db).unwrap(), "ada");
        tracker.start_session("one two three four").unwrap();
        tracker.update_progress(4, 300);
        tracker.save_quiz_result(1, 2).unwrap();
        tracker.end_session().unwrap();
    }

    let out = speedread(dir.path())
        .arg("--stats")
        .arg("--export")
        .arg(&csv_path)
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();

    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("exported 1 sessions"), "{stdout}");
    assert!(stdout.contains("Sessions:    1"), "{stdout}");
    assert!(stdout.contains("Words read:  4"), "{stdout}");
    assert!(stdout.contains("Quiz score:  50%"), "{stdout}");

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.lines().nth(1).unwrap().contains(",ada,"));
}

#[test]
fn reader_needs_a_terminal() {
    let dir = tempdir().unwrap();
    let out = speedread(dir.path())
        .args(["-p", "hello"])
        .arg("--db")
        .arg(dir.path().join("sessions.db"))
        .output()
        .unwrap();

    assert!(!out.status.success());
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("stdin must be a tty"), "{stderr}");
}

#[test]
fn conflicting_sources_are_rejected() {
    let dir = tempdir().unwrap();
    let out = speedread(dir.path())
        .args(["-p", "hello", "--sample"])
        .output()
        .unwrap();
    assert!(!out.status.success());
}
