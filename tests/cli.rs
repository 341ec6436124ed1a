use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

const HOST_IR: &str = r#"
target datalayout = "e-m:e-i64:64-f80:128-n8:16:32:64-S128"

declare i32 @cudaSetupArgument(i8*, i64, i64)
declare i32 @cudaLaunch(i8*)
declare void @foo(i32)

define i32 @launch_foo() {
entry:
  %a = alloca i32
  store i32 7, i32* %a
  %a.raw = bitcast i32* %a to i8*
  %r1 = call i32 @cudaSetupArgument(i8* %a.raw, i64 4, i64 0)
  %r2 = call i32 @cudaLaunch(i8* bitcast (void (i32)* @foo to i8*))
  ret i32 %r2
}
"#;

fn hostpatch() -> Command {
    Command::cargo_bin("hostpatch").expect("binary builds")
}

#[test]
fn no_arguments_exits_one_with_usage() {
    hostpatch()
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn too_few_arguments_exits_one() {
    hostpatch()
        .arg("only-input.ll")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn missing_input_file_fails_without_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kernel = dir.path().join("kernel.cl");
    fs::write(&kernel, "__kernel void foo(int n) {}").expect("write kernel");
    let output = dir.path().join("patchedhost.ll");

    hostpatch()
        .arg(dir.path().join("does-not-exist.ll"))
        .arg(&kernel)
        .arg(&output)
        .assert()
        .failure();
    assert!(!output.exists(), "no output is written on failure");
}

#[test]
fn patches_a_module_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("rawhost.ll");
    fs::write(&input, HOST_IR).expect("write host IR");
    let kernel = dir.path().join("kernel.cl");
    fs::write(&kernel, "__kernel void foo(int n) {}").expect("write kernel");
    let output = dir.path().join("patchedhost.ll");

    hostpatch()
        .arg(&input)
        .arg(&kernel)
        .arg(&output)
        .assert()
        .success();

    let patched = fs::read_to_string(&output).expect("patched module exists");
    assert!(patched.contains("call void @configureKernel"));
    assert!(patched.contains("call void @_Z17setKernelArgInt32i"));
    assert!(patched.contains("call void @_Z8kernelGov()"));
    assert!(patched.contains("@__opencl_sourcecode"));
    assert!(patched.contains("__kernel void foo"));
    assert!(!patched.contains("call i32 @cudaLaunch"));
}

#[test]
fn malformed_staging_aborts_without_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("rawhost.ll");
    // The staging operand is a constant cast of a global, not a cast
    // instruction wrapping a stack slot.
    fs::write(
        &input,
        r#"
@g = global i32 0

declare i32 @cudaSetupArgument(i8*, i64, i64)
declare i32 @cudaLaunch(i8*)
declare void @foo(i32)

define i32 @launch_foo() {
entry:
  %r1 = call i32 @cudaSetupArgument(i8* bitcast (i32* @g to i8*), i64 4, i64 0)
  %r2 = call i32 @cudaLaunch(i8* bitcast (void (i32)* @foo to i8*))
  ret i32 %r2
}
"#,
    )
    .expect("write host IR");
    let kernel = dir.path().join("kernel.cl");
    fs::write(&kernel, "__kernel void foo(int n) {}").expect("write kernel");
    let output = dir.path().join("patchedhost.ll");

    hostpatch()
        .arg(&input)
        .arg(&kernel)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("stage-argument"));
    assert!(!output.exists());
}

#[test]
fn malformed_launch_aborts_without_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("rawhost.ll");
    fs::write(
        &input,
        r#"
declare i32 @cudaLaunch(i8*)

define i32 @bad(i8* %target) {
entry:
  %r = call i32 @cudaLaunch(i8* %target)
  ret i32 %r
}
"#,
    )
    .expect("write host IR");
    let kernel = dir.path().join("kernel.cl");
    fs::write(&kernel, "__kernel void foo() {}").expect("write kernel");
    let output = dir.path().join("patchedhost.ll");

    hostpatch()
        .arg(&input)
        .arg(&kernel)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("launch"));
    assert!(!output.exists());
}
