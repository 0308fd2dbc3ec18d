use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const HELLO: &str = "\
include the standard input and output

to do the main thing:
    say \"Hello, World!\"
end
";

fn write_source(dir: &tempfile::TempDir, name: &str, source: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, source).unwrap();
    path
}

#[test]
fn emit_c_writes_translation_unit_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(&dir, "hello.zn", HELLO);

    let mut cmd = Command::cargo_bin("zincc").unwrap();
    cmd.arg(&source).arg("--emit-c");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("int main(void)"))
        .stdout(predicate::str::contains("printf(\"Hello, World!\\n\");"));
}

#[test]
fn emit_c_honors_output_flag() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(&dir, "hello.zn", HELLO);
    let out = dir.path().join("hello.c");

    let mut cmd = Command::cargo_bin("zincc").unwrap();
    cmd.arg(&source).arg("--emit-c").arg("-o").arg(&out);
    cmd.assert().success();

    let unit = std::fs::read_to_string(&out).unwrap();
    assert!(unit.contains("Hello, World!"));
}

#[test]
fn disassemble_dumps_bytecode() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(&dir, "hello.zn", HELLO);

    let mut cmd = Command::cargo_bin("zincc").unwrap();
    cmd.arg(&source).arg("--disassemble");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("function main()"))
        .stdout(predicate::str::contains("PUSH_STR \"Hello, World!\""))
        .stdout(predicate::str::contains("PRINT_STR"));
}

#[test]
fn parse_error_exits_nonzero_with_position() {
    let dir = tempfile::tempdir().unwrap();
    // `define` with nothing to define is malformed on purpose
    let source = write_source(&dir, "bad.zn", "define\n");

    let mut cmd = Command::cargo_bin("zincc").unwrap();
    cmd.arg(&source).arg("--emit-c");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("1:"));
}

#[test]
fn duplicate_function_is_a_compile_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(
        &dir,
        "dup.zn",
        "to greet:\n    say 1\nend\n\nto greet:\n    say 2\nend\n",
    );

    let mut cmd = Command::cargo_bin("zincc").unwrap();
    cmd.arg(&source).arg("--emit-c");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("duplicate function"));
}

#[test]
fn raw_c_line_survives_into_translation_unit() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(
        &dir,
        "raw.zn",
        "to do the main thing:\n    printf(\"raw %d\\n\", 42);\nend\n",
    );

    let mut cmd = Command::cargo_bin("zincc").unwrap();
    cmd.arg(&source).arg("--emit-c");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("printf(\"raw %d\\n\", 42);"));
}

#[test]
fn warns_on_wrong_extension() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(&dir, "hello.txt", HELLO);

    let mut cmd = Command::cargo_bin("zincc").unwrap();
    cmd.arg(&source).arg("--emit-c");
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("warning"));
}
