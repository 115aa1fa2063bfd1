//! Background job collection.
//!
//! SIGCHLD is blocked in the shell and received with `sigwait` by a watcher
//! thread, which forwards it to every live reaper. A reaper owns the
//! background jobs handed to it and only ever waits on their process groups,
//! so children a foreground wait is blocked on are never touched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use std::{io, mem, thread};

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, trace, warn};

use crate::job::{Disposition, Job};

/// Also sweep this often while jobs are outstanding, for SIGCHLDs taken by
/// threads that do not block it.
const SWEEP_INTERVAL: Duration = Duration::from_millis(200);

enum Event {
	ChildExited,
	Adopt(Job),
	Shutdown,
}

static SUBSCRIBERS: Mutex<Vec<Sender<Event>>> = Mutex::new(Vec::new());
static WATCHING: Mutex<bool> = Mutex::new(false);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
	m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sigchld() -> SigSet {
	let mut set = SigSet::empty();
	set.add(Signal::SIGCHLD);
	set
}

extern "C" fn on_sigchld(_: libc::c_int) {}

fn watch() {
	let set = sigchld();
	let _ = set.thread_block();
	loop {
		match set.wait() {
			Ok(_) => {
				trace!("SIGCHLD");
				lock(&SUBSCRIBERS).retain(|tx| tx.send(Event::ChildExited).is_ok());
			},
			Err(Errno::EINTR) => {},
			Err(e) => {
				warn!(error = %e, "sigwait failed, background jobs fall back to polling");
				return;
			},
		}
	}
}

fn start_watcher() -> io::Result<()> {
	let mut watching = lock(&WATCHING);
	if *watching {
		return Ok(());
	}
	// SIG_IGN would make the kernel discard child statuses, so install a
	// handler that does nothing instead.
	let action = SigAction::new(SigHandler::Handler(on_sigchld), SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP, SigSet::empty());
	unsafe { signal::sigaction(Signal::SIGCHLD, &action) }?;
	thread::Builder::new().name("ish-sigchld".to_string()).spawn(watch)?;
	*watching = true;
	Ok(())
}

struct Table {
	jobs: Vec<Job>,
	finished: Arc<Mutex<Vec<Job>>>,
	pending: Arc<AtomicUsize>,
}

impl Table {
	fn run(mut self, rx: Receiver<Event>) {
		loop {
			let event = if self.jobs.is_empty() {
				rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
			} else {
				rx.recv_timeout(SWEEP_INTERVAL)
			};
			match event {
				Ok(Event::Adopt(job)) => {
					debug!(pgid = ?job.pgid, pids = ?job.pids(), "adopted background job");
					self.jobs.push(job);
				},
				Ok(Event::ChildExited) | Err(RecvTimeoutError::Timeout) => {},
				Ok(Event::Shutdown) | Err(RecvTimeoutError::Disconnected) => { break; },
			}
			self.sweep();
		}
		debug!(outstanding = self.jobs.len(), "reaper stopped");
	}

	fn sweep(&mut self) {
		for job in self.jobs.iter_mut() {
			collect(job);
		}
		let (done, running): (Vec<Job>, Vec<Job>) = mem::take(&mut self.jobs).into_iter().partition(Job::is_terminated);
		self.jobs = running;
		if !done.is_empty() {
			let n = done.len();
			lock(&self.finished).extend(done);
			self.pending.fetch_sub(n, Ordering::SeqCst);
		}
	}
}

/// Collects whatever has already terminated in the job's process group.
fn collect(job: &mut Job) {
	let group = match job.pgid {
		Some(pgid) => Pid::from_raw(-pgid.as_raw()),
		None => {
			warn!(pids = ?job.pids(), "background job without a process group");
			job.forget_remaining();
			return;
		},
	};
	while !job.is_terminated() {
		match wait::waitpid(group, Some(WaitPidFlag::WNOHANG)) {
			Ok(WaitStatus::StillAlive) => { break; },
			Ok(status) => {
				trace!(?status, "reaped background child");
				if !job.record(status) {
					warn!(?status, "collected a child that is not part of the job");
				}
			},
			Err(Errno::EINTR) => {},
			Err(Errno::ECHILD) => job.forget_remaining(),
			Err(e) => {
				warn!(pgid = %group, error = %e, "waitpid failed");
				break;
			},
		}
	}
}

/// Handle to a reaper thread. Dropping it stops the thread; jobs still
/// running at that point are left to the process's exit.
pub struct Reaper {
	tx: Sender<Event>,
	finished: Arc<Mutex<Vec<Job>>>,
	pending: Arc<AtomicUsize>,
}

impl Reaper {
	/// Blocks SIGCHLD in the calling thread, which should be the one running
	/// the interactive loop, and starts collecting.
	pub fn start() -> io::Result<Reaper> {
		sigchld().thread_block()?;
		start_watcher()?;
		let (tx, rx) = mpsc::channel();
		let finished = Arc::new(Mutex::new(Vec::new()));
		let pending = Arc::new(AtomicUsize::new(0));
		let table = Table { jobs: Vec::new(), finished: finished.clone(), pending: pending.clone() };
		thread::Builder::new().name("ish-reaper".to_string()).spawn(move || table.run(rx))?;
		lock(&SUBSCRIBERS).push(tx.clone());
		Ok(Reaper { tx: tx, finished: finished, pending: pending })
	}

	/// Takes ownership of a background job. Nothing else may wait on its
	/// processes afterwards.
	pub fn adopt(&self, job: Job) {
		debug_assert_eq!(job.disposition, Disposition::Background);
		self.pending.fetch_add(1, Ordering::SeqCst);
		if self.tx.send(Event::Adopt(job)).is_err() {
			self.pending.fetch_sub(1, Ordering::SeqCst);
			warn!("reaper thread is gone, background job will not be collected");
		}
	}

	/// Background jobs adopted but not yet fully collected.
	pub fn pending(&self) -> usize {
		self.pending.load(Ordering::SeqCst)
	}

	/// Drains jobs whose every process has been collected.
	pub fn take_finished(&self) -> Vec<Job> {
		mem::take(&mut *lock(&self.finished))
	}
}

impl Drop for Reaper {
	fn drop(&mut self) {
		let _ = self.tx.send(Event::Shutdown);
	}
}
