//! Drives the `ish` binary through its standard input.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn ish(args: &[&str], input: &str) -> Output {
	let mut child = Command::new(env!("CARGO_BIN_EXE_ish"))
		.args(args)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.expect("failed to spawn ish");
	child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
	child.wait_with_output().unwrap()
}

fn quiet(input: &str) -> Output {
	ish(&["--no-prompt"], input)
}

fn stdout(output: &Output) -> String {
	String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
	String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn prompt() {
	let output = ish(&[], "");
	assert!(output.status.success());
	assert_eq!(stdout(&output), "ish> ");
}

#[test]
fn custom_prompt() {
	let output = ish(&["--prompt", "$ "], "\n");
	assert_eq!(stdout(&output), "$ $ ");
}

#[test]
fn end_of_input_is_success() {
	let output = quiet("echo hi\n");
	assert!(output.status.success());
	assert_eq!(stdout(&output), "hi\n");
}

#[test]
fn last_line_without_newline() {
	let output = quiet("echo hi");
	assert_eq!(stdout(&output), "hi\n");
}

#[test]
fn blank_lines_are_ignored() {
	let output = quiet("\n   \n\t\t\n");
	assert!(output.status.success());
	assert_eq!(stdout(&output), "");
	assert_eq!(stderr(&output), "");
}

#[test]
fn exit_stops_reading() {
	let output = quiet("echo before\nexit   \necho after\n");
	assert!(output.status.success());
	assert_eq!(stdout(&output), "before\n");
}

#[test]
fn quit_with_arguments() {
	let output = quiet("quit now\necho after\n");
	assert!(output.status.success());
	assert_eq!(stdout(&output), "");
}

#[test]
fn failing_commands_do_not_end_the_session() {
	let output = quiet("false\nno-such-program-for-ish-tests\necho still here\n");
	assert!(output.status.success());
	assert_eq!(stdout(&output), "still here\n");
	assert!(stderr(&output).contains("no-such-program-for-ish-tests: command not found"));
}

#[test]
fn syntax_errors_are_reported() {
	let output = quiet("ls |\necho after\n");
	assert!(output.status.success());
	assert_eq!(stdout(&output), "after\n");
	assert!(stderr(&output).contains("syntax error: empty command"));
}

#[test]
fn pipelines() {
	let output = quiet("echo a b | wc -w\n");
	assert_eq!(stdout(&output).trim(), "2");
}

#[test]
fn background_jobs_are_announced() {
	let output = quiet("true &\nsleep 0.5\n");
	let out = stdout(&output);
	let lines: Vec<&str> = out.lines().collect();
	assert_eq!(lines.len(), 2, "{:?}", out);
	let pid = lines[0].trim_start_matches('[').trim_end_matches(']');
	assert!(pid.parse::<u32>().is_ok(), "{:?}", lines[0]);
	assert_eq!(lines[1], format!("[{}] Done", pid));
}
