use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;
use std::path::Path;

const GREETING: &str = "---\ntitle: Greeting\n---\n\n### record human_text_record\n---\ngenseq: 1\nmsgId: m1\ngrammar: markdown\n---\nHello\n\n### record gen_finish_record\n---\ngenseq: 1\n---\n";

fn stdout_of(out: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(out.get_output().stdout.clone()).expect("utf8")
}

fn stderr_of(out: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(out.get_output().stderr.clone()).expect("utf8")
}

fn seed_workspace(dir: &Path) {
    let script = dir.join(".priming/scripts/team_shared/greeting.md");
    fs::create_dir_all(script.parent().expect("parent")).expect("mkdir");
    fs::write(&script, GREETING).expect("write script");

    let dialog = dir.join(".priming/dialogs/running/d1");
    fs::create_dir_all(&dialog).expect("mkdir");
    fs::write(
        dialog.join("dialog.json"),
        r#"{"dialogId":"d1","agentId":"alice","currentCourse":1}"#,
    )
    .expect("write metadata");
    fs::write(
        dialog.join("course-001.jsonl"),
        "{\"ts\":\"2026-10-17T08:00:00.000Z\",\"type\":\"gen_start_record\",\"genseq\":7}\n",
    )
    .expect("write course");
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = stdout_of(&out);
    for sub in ["list", "search", "show", "check", "apply", "export"] {
        assert!(stdout.contains(sub), "help should mention {sub}");
    }
}

#[test]
fn check_accepts_valid_and_rejects_invalid_scripts() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("ok.md"), GREETING).expect("write");
    fs::write(temp.path().join("bad.md"), "### record chat_record\nhi\n").expect("write");

    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--working-dir").arg(temp.path()).arg("check").arg(temp.path().join("ok.md"));
    let out = cmd.assert().success();
    assert!(stdout_of(&out).contains("ok: 2 record(s)"));

    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--working-dir").arg(temp.path()).arg("check").arg(temp.path().join("bad.md"));
    let out = cmd.assert().failure();
    assert!(stderr_of(&out).contains("unknown record type `chat_record`"));
}

#[test]
fn apply_then_list_then_export_round_trip() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_workspace(temp.path());

    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--working-dir")
        .arg(temp.path())
        .args(["apply", "--agent", "alice", "--dialog", "d1", "team_shared/greeting"]);
    let out = cmd.assert().success();
    let outcome: serde_json::Value = serde_json::from_str(&stdout_of(&out)).expect("json");
    assert_eq!(outcome["appliedRefs"][0], "team_shared/greeting");
    assert_eq!(outcome["appendedMessageCount"], 1);

    let course = fs::read_to_string(temp.path().join(".priming/dialogs/running/d1/course-001.jsonl"))
        .expect("course");
    let lines: Vec<serde_json::Value> = course
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1]["genseq"], 8);
    assert_eq!(lines[2]["genseq"], 8);
    assert_eq!(lines[2]["sourceTag"], "priming_script");

    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--working-dir")
        .arg(temp.path())
        .args(["list", "--agent", "alice"]);
    let out = cmd.assert().success();
    let listing: serde_json::Value = serde_json::from_str(&stdout_of(&out)).expect("json");
    assert_eq!(listing["recent"][0]["ref"], "team_shared/greeting");
    assert_eq!(listing["teamShared"][0]["title"], "Greeting");

    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--working-dir")
        .arg(temp.path())
        .args(["export", "--dialog", "d1", "--course", "1", "--slug", "replayed"]);
    let out = cmd.assert().success();
    let exported: serde_json::Value = serde_json::from_str(&stdout_of(&out)).expect("json");
    assert_eq!(exported["summary"]["ref"], "individual/alice/replayed");
    assert_eq!(exported["messageCount"], 3);
    assert!(temp
        .path()
        .join(".priming/scripts/individual/alice/replayed.md")
        .exists());

    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--working-dir")
        .arg(temp.path())
        .args(["show", "--agent", "alice", "individual/alice/replayed"]);
    let out = cmd.assert().success();
    assert!(stdout_of(&out).contains("### record human_text_record"));

    assert!(temp.path().join(".priming/logs/run.jsonl").exists());
}

#[test]
fn traversal_refs_and_missing_config_fail() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--working-dir")
        .arg(temp.path())
        .args(["show", "--agent", "alice", "../etc/passwd"]);
    let out = cmd.assert().failure();
    assert!(stderr_of(&out).contains("invalid script ref"));

    let mut cmd = cargo_bin_cmd!("priming");
    cmd.arg("--config")
        .arg(temp.path().join("missing.toml"))
        .args(["list", "--agent", "alice"]);
    cmd.assert().failure();
}
