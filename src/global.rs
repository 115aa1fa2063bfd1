use std::io;

use nix::sys::signal::{self, SigHandler, Signal};

use crate::reaper::Reaper;

pub struct State {
	pub reaper: Reaper,
}

impl State {
	pub fn new() -> io::Result<State> {
		let reaper = Reaper::start()?;
		Ok(State { reaper: reaper })
	}
}

/// Keeps terminal interrupts from killing the shell itself. Children restore
/// the default dispositions before exec.
pub fn ignore_interrupts() -> nix::Result<()> {
	unsafe {
		signal::signal(Signal::SIGINT, SigHandler::SigIgn)?;
		signal::signal(Signal::SIGQUIT, SigHandler::SigIgn)?;
	}
	Ok(())
}
