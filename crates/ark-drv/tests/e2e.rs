//! End-to-end scenarios through the `ark` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn ark() -> Command {
    Command::cargo_bin("ark").expect("binary builds")
}

fn write(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_ackermann() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "ack.ark",
        r#"
(let ack (fun (m n)
  (if (= m 0) (+ n 1)
    (if (= n 0) (ack (- m 1) 1)
      (ack (- m 1) (ack m (- n 1)))))))
(print (ack 3 6))
"#,
    );
    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("509"));
}

#[test]
fn test_closure_capture() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "closure.ark",
        r#"
(let make (fun (x) (fun (y) (+ x y))))
(let add5 (make 5))
(print (add5 7))
"#,
    );
    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("12"));
}

#[test]
fn test_mutability_violation_fails_compilation() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "immutable.ark", "(let x 1) (set x 2)");
    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("immutable"));
}

#[test]
fn test_async_await() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "async.ark",
        r#"
(let f (fun (x) (* x 2)))
(let a (async f 21))
(print (await a))
"#,
    );
    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_macro_expansion() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "macro.ark",
        r#"
($ when (c body) (if c body nil))
(print (when true 7))
"#,
    );
    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("7"));
}

#[test]
fn test_division_by_zero() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "div.ark", "(print (/ 10 0))");
    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DivisionByZero"));
}

#[test]
fn test_sys_exit_code_is_propagated() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "exit.ark", "(sys:exit 3)");
    ark().arg("run").arg(&file).assert().code(3);
}

#[test]
fn test_compile_then_run_bytecode() {
    let dir = tempfile::tempdir().unwrap();
    let src = write(dir.path(), "prog.ark", "(print (+ 40 2))");
    let dst = dir.path().join("prog.arkc");

    ark()
        .arg("compile")
        .arg(&src)
        .arg(&dst)
        .assert()
        .success();

    ark()
        .arg("run")
        .arg(&dst)
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_corrupted_bytecode_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let src = write(dir.path(), "prog.ark", "(print 1)");
    let dst = dir.path().join("prog.arkc");

    ark().arg("compile").arg(&src).arg(&dst).assert().success();

    let mut bytes = std::fs::read(&dst).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&dst, bytes).unwrap();

    ark()
        .arg("run")
        .arg(&dst)
        .assert()
        .failure()
        .stderr(predicate::str::contains("sha256"));
}

#[test]
fn test_dump_segments() {
    let dir = tempfile::tempdir().unwrap();
    let src = write(dir.path(), "prog.ark", "(let value 12)\n(print value)");
    let dst = dir.path().join("prog.arkc");
    ark().arg("compile").arg(&src).arg(&dst).assert().success();

    ark()
        .arg("dump")
        .arg(&dst)
        .assert()
        .success()
        .stdout(predicate::str::contains("version:"))
        .stdout(predicate::str::contains("sha256:"))
        .stdout(predicate::str::contains("value"))
        .stdout(predicate::str::contains("page 0"));

    ark()
        .arg("dump")
        .arg(&dst)
        .args(["--segment", "symbols"])
        .assert()
        .success()
        .stdout(predicate::str::contains("value"))
        .stdout(predicate::str::contains("page 0").not());
}

#[test]
fn test_ast_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let src = write(dir.path(), "prog.ark", "(let a (+ 1 2))");

    let output = ark()
        .arg("ast")
        .arg(&src)
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json = String::from_utf8(output).unwrap();
    let ast: ark_par::Node = serde_json::from_str(&json).unwrap();
    let json_again = serde_json::to_string(&ast).unwrap();
    let ast_again: ark_par::Node = serde_json::from_str(&json_again).unwrap();
    assert_eq!(ast, ast_again);
    assert!(json.contains("Keyword"));
}

#[test]
fn test_import_with_search_path() {
    let lib = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    write(
        lib.path(),
        "mathx.ark",
        "(let double (fun (x) (* x 2)))",
    );
    let file = write(
        dir.path(),
        "main.ark",
        "(import mathx:*)\n(print (double 21))",
    );

    ark()
        .arg("-L")
        .arg(lib.path())
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_import_basic_prefixing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "util.ark", "(let answer 42)");
    let file = write(dir.path(), "main.ark", "(import util)\n(print util.answer)");

    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_unbound_variable_has_suggestion() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "typo.ark", "(let value 1)\n(print vlaue)");
    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean"));
}

#[test]
fn test_missing_import_is_an_error_with_location() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "ghost.ark", "(import ghost.module)");
    ark()
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to find module"));
}
