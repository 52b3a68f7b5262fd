use std::path::PathBuf;
use std::process::Command;

use ls8::loader;
use ls8::vm::{Error, State, Vm, STACK_EMPTY};

/// Load a listing and run it to completion, returning the printed output
fn run_listing(source: &str) -> (Vm, Result<String, Error>) {
  let program = loader::parse_str(source).unwrap();
  let mut vm = Vm::with_program(&program).unwrap();
  let mut out = Vec::new();
  let result = vm.run(&mut out).map(|()| String::from_utf8(out).unwrap());
  (vm, result)
}

fn fixture(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

fn demo(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("programs")
    .join(name)
}

#[test]
fn print8_from_lines() {
  let program = loader::parse([
    "10000010", "00000000", "00001000", "01000111", "00000000", "00000001",
  ])
  .unwrap();
  let mut vm = Vm::with_program(&program).unwrap();
  let mut out = Vec::new();
  vm.run(&mut out).unwrap();
  assert_eq!(out, b"8\n");
  assert_eq!(vm.state(), State::Halted);
}

#[test]
fn invalid_opcode_stops_execution() {
  let (vm, result) = run_listing(
    "\
10000010 # LDI R0,1
00000000
00000001
11111111 # not an instruction
01000111 # PRN R0, never reached
00000000
00000001
",
  );
  assert_eq!(
    result,
    Err(Error::InvalidOpcode {
      address: 3,
      opcode: 0xFF
    })
  );
  assert_eq!(vm.state(), State::Halted);
  assert_eq!(vm.pc(), 3);
}

#[test]
fn push_push_pop_pop() {
  let (vm, result) = run_listing(
    "\
10000010 # LDI R0,5
00000000
00000101
01000101 # PUSH R0
00000000
01000101 # PUSH R0
00000000
01000110 # POP R1
00000001
01000110 # POP R2
00000010
00000001 # HLT
",
  );
  assert_eq!(result, Ok(String::new()));
  assert_eq!(vm.registers()[1], 5);
  assert_eq!(vm.registers()[2], 5);
  assert_eq!(vm.sp(), STACK_EMPTY);
}

#[test]
fn divide_by_zero_register() {
  let (vm, result) = run_listing(
    "\
10000010 # LDI R0,9
00000000
00001001
10100011 # DIV R0,R1
00000000
00000001
00000001 # HLT
",
  );
  assert!(matches!(result, Err(Error::DivisionByZero { pc: 3, .. })));
  assert_eq!(vm.registers()[0], 9);
  assert_eq!(vm.state(), State::Halted);
}

#[test]
fn demo_programs() {
  let cases = [
    ("print8.ls8", "8\n"),
    ("mult.ls8", "72\n"),
    ("stack.ls8", "2\n4\n1\n"),
    ("call.ls8", "20\n30\n36\n60\n"),
    ("cmp.ls8", "1\n4\n"),
  ];
  for (name, expected) in cases {
    let program = loader::load_file(demo(name)).unwrap();
    let mut vm = Vm::with_program(&program).unwrap();
    let mut out = Vec::new();
    vm.run(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), expected, "{name}");
    assert_eq!(vm.state(), State::Halted, "{name}");
    assert_eq!(vm.sp(), STACK_EMPTY, "{name}");
  }
}

mod cli {
  use super::*;

  fn ls8() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ls8"))
  }

  #[test]
  fn clean_halt() {
    let output = ls8()
      .arg(demo("mult.ls8"))
      .args(["--log-level", "off"])
      .output()
      .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"72\n");
  }

  #[test]
  fn default_logging_keeps_stdout_clean() {
    let output = ls8().arg(demo("print8.ls8")).output().unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"8\n");
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("halted at 0x05"), "{stderr}");
  }

  #[test]
  fn fault_is_logged_to_stderr() {
    let output = ls8().arg(fixture("invalid_opcode.ls8")).output().unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("invalid opcode"), "{stderr}");
  }

  #[test]
  fn invalid_opcode_fails() {
    let output = ls8()
      .arg(fixture("invalid_opcode.ls8"))
      .args(["--log-level", "off"])
      .output()
      .unwrap();
    assert!(!output.status.success());
    // PRN after the bad byte never runs
    assert!(output.stdout.is_empty());
  }

  #[test]
  fn malformed_listing_fails() {
    let output = ls8()
      .arg(fixture("malformed.ls8"))
      .args(["--log-level", "off"])
      .output()
      .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("line 5"), "{stderr}");
  }

  #[test]
  fn trace_goes_to_stderr() {
    let output = ls8()
      .arg(demo("print8.ls8"))
      .args(["--trace", "--log-level", "off"])
      .output()
      .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"8\n");
    let stderr = String::from_utf8(output.stderr).unwrap();
    let mut lines = stderr.lines();
    assert_eq!(
      lines.next(),
      Some("TRACE: 00 | 82 00 08 | 00 | 00 00 00 00 00 00 00 00")
    );
    assert_eq!(
      lines.next(),
      Some("TRACE: 03 | 47 00 01 | 00 | 08 00 00 00 00 00 00 00")
    );
  }

  #[test]
  fn missing_listing_fails() {
    let output = ls8()
      .arg(demo("does-not-exist.ls8"))
      .args(["--log-level", "off"])
      .output()
      .unwrap();
    assert!(!output.status.success());
  }

  #[test]
  fn step_limit_fails() {
    // call.ls8 needs far more than 3 instructions
    let output = ls8()
      .arg(demo("call.ls8"))
      .args(["--max-steps", "3", "--log-level", "off"])
      .output()
      .unwrap();
    assert!(!output.status.success());
  }
}
