//! End-to-end tests for the `cxxpy` binary.

use assert_cmd::Command;
use std::fs;
use std::path::Path;

fn cxxpy(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cxxpy").unwrap();
    cmd.current_dir(dir);
    cmd
}

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

#[test]
fn translates_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "twice.cpp", "// doubles\nint twice(int x) { return x * 2; }\n");
    cxxpy(dir.path())
        .arg("twice.cpp")
        .assert()
        .success()
        .stdout("def twice(x):\n    return x * 2\n");
}

#[test]
fn define_flags_select_branches() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "mode.cpp",
        "#ifdef FAST\nint mode = 1;\n#else\nint mode = 0;\n#endif\n",
    );
    cxxpy(dir.path())
        .args(["-D", "FAST", "mode.cpp"])
        .assert()
        .success()
        .stdout("mode = 1\n");
    cxxpy(dir.path())
        .arg("mode.cpp")
        .assert()
        .success()
        .stdout("mode = 0\n");
}

#[test]
fn config_file_supplies_defines() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "cxxpy.toml", "[defines]\nLIMIT = 8\n");
    write(dir.path(), "limit.cpp", "int limit = LIMIT;\n");
    cxxpy(dir.path())
        .arg("limit.cpp")
        .assert()
        .success()
        .stdout("limit = 8\n");
    cxxpy(dir.path())
        .args(["-D", "LIMIT=9", "limit.cpp"])
        .assert()
        .success()
        .stdout("limit = 9\n");
}

#[test]
fn out_dir_gets_every_module() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "shapes.cpp",
        "namespace geo { class P {}; }\ngeo::P *make() { return new geo::P(); }\n",
    );
    cxxpy(dir.path())
        .args(["--module", "app", "--out-dir", "out", "shapes.cpp"])
        .assert()
        .success()
        .stdout("");
    let app = fs::read_to_string(dir.path().join("out/app.py")).unwrap();
    assert!(app.starts_with("from geo import P\n"));
    let geo = fs::read_to_string(dir.path().join("out/geo.py")).unwrap();
    assert_eq!(geo, "class P:\n    pass\n");
}

#[test]
fn errors_are_reported_with_position() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bad.cpp", "int ok;\nint f( {");
    let output = cxxpy(dir.path()).arg("bad.cpp").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("bad.cpp, line 2"), "stderr: {}", stderr);
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = cxxpy(dir.path()).arg("nope.cpp").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("reading nope.cpp"));
}
