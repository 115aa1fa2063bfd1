use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{self, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, trace, warn};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Disposition { Foreground, Background }

pub trait WaitStatusExt {
	fn is_terminated(self) -> bool;
	fn code(self) -> Option<i32>;
}

impl WaitStatusExt for WaitStatus {
	fn is_terminated(self) -> bool {
		match self {
			WaitStatus::Exited(..) | WaitStatus::Signaled(..) => true,
			_ => false,
		}
	}

	fn code(self) -> Option<i32> {
		match self {
			WaitStatus::Exited(_, code) => Some(code),
			WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
			_ => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
	Running,
	Terminated(WaitStatus),
	/// Collected by somebody else; waitpid reported ECHILD.
	Vanished,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub state: State,
}

impl Process {
	pub fn is_reaped(&self) -> bool {
		self.state != State::Running
	}

	pub fn code(&self) -> Option<i32> {
		match self.state {
			State::Running => None,
			State::Terminated(status) => status.code(),
			State::Vanished => Some(0),
		}
	}

	fn update(&mut self, status: WaitStatus) {
		if status.is_terminated() {
			self.state = State::Terminated(status);
		}
	}

	fn wait(&mut self) {
		while !self.is_reaped() {
			match wait::waitpid(self.pid, None) {
				Ok(status) => self.update(status),
				Err(Errno::EINTR) => {},
				Err(Errno::ECHILD) => {
					debug!(pid = %self.pid, "no such child, treating as reaped");
					self.state = State::Vanished;
				},
				Err(e) => warn!(pid = %self.pid, error = %e, "waitpid failed, retrying"),
			}
		}
		trace!(pid = %self.pid, state = ?self.state, "reaped");
	}
}

/// The processes of one pipeline, in stage order.
#[derive(Debug)]
pub struct Job {
	/// Own process group of a background job. Foreground stages stay in the
	/// shell's group.
	pub pgid: Option<Pid>,
	pub disposition: Disposition,
	pub processes: Vec<Process>,
}

impl Job {
	pub fn leader(&self) -> Pid {
		self.processes[0].pid
	}

	pub fn pids(&self) -> Vec<Pid> {
		self.processes.iter().map(|pr| pr.pid).collect()
	}

	pub fn is_terminated(&self) -> bool {
		self.processes.iter().all(Process::is_reaped)
	}

	/// Only the last stage's status counts for a pipeline.
	pub fn code(&self) -> Option<i32> {
		self.processes.last().and_then(Process::code)
	}

	/// Blocks until every stage has terminated and returns the pipeline status.
	pub fn wait(&mut self) -> i32 {
		debug_assert_eq!(self.disposition, Disposition::Foreground);
		for pr in self.processes.iter_mut() {
			pr.wait();
		}
		self.code().unwrap_or(0)
	}

	/// Kills and collects whatever already started of a pipeline that could
	/// not be launched completely. The job is never handed to the reaper.
	pub fn abandon(&mut self) {
		for pr in self.processes.iter_mut().filter(|pr| !pr.is_reaped()) {
			if let Err(e) = signal::kill(pr.pid, Signal::SIGKILL) {
				debug!(pid = %pr.pid, error = %e, "kill failed");
			}
			pr.wait();
		}
	}

	/// Records a status collected for one of this job's processes. Returns
	/// false if the pid is not part of the job.
	pub(crate) fn record(&mut self, status: WaitStatus) -> bool {
		let pid = match status.pid() {
			Some(pid) => pid,
			None => { return false; },
		};
		match self.processes.iter_mut().find(|pr| pr.pid == pid) {
			Some(pr) => {
				pr.update(status);
				true
			},
			None => false,
		}
	}

	pub(crate) fn forget_remaining(&mut self) {
		for pr in self.processes.iter_mut().filter(|pr| !pr.is_reaped()) {
			pr.state = State::Vanished;
		}
	}
}

impl fmt::Display for Job {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "[{}] ", self.leader())?;
		match self.processes.last().map(|pr| pr.state) {
			None | Some(State::Running) => write!(f, "Running"),
			Some(State::Terminated(WaitStatus::Signaled(_, signal, _))) => write!(f, "Killed by signal {}", signal as i32),
			_ => match self.code() {
				Some(0) | None => write!(f, "Done"),
				Some(code) => write!(f, "Exit {}", code),
			},
		}
	}
}

#[derive(Debug)]
pub struct JobBuilder {
	imp: Job,
	#[cfg(test)]
	fork_limit: Option<usize>,
}

impl JobBuilder {
	pub fn new(size_hint: usize, disposition: Disposition) -> JobBuilder {
		JobBuilder {
			imp: Job { pgid: None, disposition: disposition, processes: Vec::with_capacity(size_hint) },
			#[cfg(test)]
			fork_limit: None,
		}
	}

	/// Makes every fork after the first `n` fail with EAGAIN.
	#[cfg(test)]
	pub(crate) fn fail_after(mut self, n: usize) -> JobBuilder {
		self.fork_limit = Some(n);
		self
	}

	/// Forks the next stage. Background stages join a process group led by
	/// the first stage; parent and child both call setpgid.
	pub fn push_fork(&mut self) -> nix::Result<ForkResult> {
		#[cfg(test)]
		{
			if self.fork_limit.map_or(false, |n| self.imp.processes.len() >= n) {
				return Err(Errno::EAGAIN);
			}
		}
		let job = &mut self.imp;

		let r = unsafe { unistd::fork() }?;
		match r {
			ForkResult::Parent{ child: pid } => {
				if job.disposition == Disposition::Background {
					let pgid = *job.pgid.get_or_insert(pid);
					// EACCES once the child has exec'd; it already joined by then.
					let _ = unistd::setpgid(pid, pgid);
				}
				job.processes.push(Process { pid: pid, state: State::Running });
			},
			ForkResult::Child => {
				if job.disposition == Disposition::Background {
					let _ = unistd::setpgid(Pid::from_raw(0), job.pgid.unwrap_or(Pid::from_raw(0)));
				}
			},
		}
		Ok(r)
	}

	pub fn is_empty(&self) -> bool {
		self.imp.processes.is_empty()
	}

	pub fn build(self) -> Option<Job> {
		if self.is_empty() { None } else { Some(self.imp) }
	}
}
