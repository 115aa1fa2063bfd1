use std::io;
use std::io::{BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use argh::FromArgs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ish::eval::{self, EvalResult};
use ish::global;

const PROMPT: &str = "ish> ";

/// A small interactive shell.
#[derive(FromArgs)]
struct Config {
	/// prompt printed before each line
	#[argh(option, default = "String::from(PROMPT)")]
	prompt: String,

	/// do not print a prompt
	#[argh(switch)]
	no_prompt: bool,
}

fn main() -> Result<()> {
	let config: Config = argh::from_env();

	// RUST_LOG controls verbosity; logs go to stderr.
	tracing_subscriber::registry()
		.with(fmt::layer().with_writer(io::stderr))
		.with(EnvFilter::from_default_env())
		.init();

	let mut state = global::State::new().context("cannot start the background job reaper")?;
	let stdin = io::stdin();
	if stdin.is_terminal() {
		global::ignore_interrupts().context("cannot ignore interrupt signals")?;
	}

	let mut stdout = io::stdout();
	let mut stdin_locked = stdin.lock();
	let mut line: Vec<u8> = vec![];
	loop {
		for job in state.reaper.take_finished() {
			let _ = writeln!(stdout, "{}", job);
		}
		if !config.no_prompt {
			let _ = stdout.write_all(config.prompt.as_bytes());
		}
		let _ = stdout.flush();

		line.clear();
		let n = stdin_locked.read_until(b'\n', &mut line).context("cannot read input")?;
		if n == 0 {
			return Ok(());
		}
		match eval::eval_line(&mut state, &line) {
			EvalResult::Exit => { return Ok(()); },
			EvalResult::Background(pid) => {
				let _ = writeln!(stdout, "[{}]", pid);
			},
			EvalResult::Nothing | EvalResult::Rejected | EvalResult::Done(_) => {},
		}
	}
}
