use std::ffi::{CStr, CString, NulError};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::ptr;

use libc::c_char;
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::signal::{self, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::{debug, warn};

use crate::global;
use crate::job::{Disposition, JobBuilder};
use crate::parser::{self, Parsed};
use crate::search::SearchPath;
use crate::tokenizer;
use crate::types::*;

/// The program could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// The program was found but could not be started, or the pipeline could
/// not be launched at all.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;
/// A redirection target could not be opened.
pub const EXIT_REDIRECT_FAILED: i32 = 1;

#[derive(Debug, Error)]
pub enum LaunchError {
	#[error("cannot create pipe: {0}")]
	Pipe(#[source] Errno),
	#[error("cannot fork: {0}")]
	Fork(#[source] Errno),
	#[error("argument contains a NUL byte")]
	Nul(#[from] NulError),
}

/// Everything a child needs to exec, built before forking so that the child
/// never allocates.
struct Program {
	path: Option<CString>,
	argv: Vec<CString>,
	argv_ptrs: Vec<*const c_char>,
}

impl Program {
	fn prepare(search: &SearchPath, command: &Command) -> Result<Program, NulError> {
		let argv: Vec<CString> = command.argv.iter().map(|&s| CString::new(s)).collect::<Result<_, _>>()?;
		let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|s| s.as_ptr()).collect();
		argv_ptrs.push(ptr::null());
		Ok(Program { path: search.lookup(command.name()), argv: argv, argv_ptrs: argv_ptrs })
	}

	fn name(&self) -> &CStr {
		&self.argv[0]
	}
}

struct Target {
	path: CString,
	flags: OFlag,
}

impl Target {
	fn prepare(redirect: &Redirect) -> Result<Target, NulError> {
		let flags = match redirect.typ {
			RedirectType::Input => OFlag::O_RDONLY,
			RedirectType::Output => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
			RedirectType::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
		};
		Ok(Target { path: CString::new(redirect.target)?, flags: flags })
	}
}

/// Pipe ends bound to one stage's stdin and stdout.
#[derive(Debug, Default)]
struct StageIo {
	stdin: Option<OwnedFd>,
	stdout: Option<OwnedFd>,
}

/// One entry per stage. Pipes are close-on-exec, so a child keeps only the
/// ends it dup2's onto its standard streams.
fn wire(n: usize) -> Result<Vec<StageIo>, LaunchError> {
	let mut table: Vec<StageIo> = (0 .. n).map(|_| StageIo::default()).collect();
	for i in 1 .. n {
		let (pipe_read, pipe_write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::Pipe)?;
		table[i - 1].stdout = Some(pipe_write);
		table[i].stdin = Some(pipe_read);
	}
	Ok(table)
}

// Everything from here to `exec_command` runs in a forked child and must
// stay async-signal-safe: no allocation, no locks, no tracing.

fn child_report(name: &[u8], msg: &[u8]) {
	for part in [&b"ish: "[..], name, &b": "[..], msg, &b"\n"[..]] {
		unsafe { libc::write(libc::STDERR_FILENO, part.as_ptr() as *const libc::c_void, part.len()) };
	}
}

fn child_exit(code: i32) -> ! {
	unsafe { libc::_exit(code) }
}

fn reset_signals() {
	unsafe {
		let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
		let _ = signal::signal(Signal::SIGQUIT, SigHandler::SigDfl);
		let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigDfl);
	}
	let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);
}

fn bind(fd: Option<OwnedFd>, to: RawFd) -> nix::Result<()> {
	if let Some(fd) = fd {
		unistd::dup2(fd.as_raw_fd(), to)?;
	}
	Ok(())
}

fn open_onto(target: &Target, to: RawFd) -> nix::Result<()> {
	let fd = fcntl::open(target.path.as_c_str(), target.flags, Mode::from_bits_truncate(0o666))?;
	if fd != to {
		unistd::dup2(fd, to)?;
		unistd::close(fd)?;
	}
	Ok(())
}

fn exec_command(program: &Program, io: StageIo, input: Option<&Target>, output: Option<&Target>) -> ! {
	reset_signals();

	if let Err(e) = bind(io.stdin, libc::STDIN_FILENO).and_then(|_| bind(io.stdout, libc::STDOUT_FILENO)) {
		child_report(b"dup2", e.desc().as_bytes());
		child_exit(EXIT_CANNOT_EXECUTE);
	}
	for (target, to) in [(input, libc::STDIN_FILENO), (output, libc::STDOUT_FILENO)] {
		if let Some(target) = target {
			if let Err(e) = open_onto(target, to) {
				child_report(target.path.to_bytes(), e.desc().as_bytes());
				child_exit(EXIT_REDIRECT_FAILED);
			}
		}
	}

	let path = match program.path {
		Some(ref path) => path,
		None => {
			child_report(program.name().to_bytes(), b"command not found");
			child_exit(EXIT_NOT_FOUND);
		},
	};
	unsafe { libc::execv(path.as_ptr(), program.argv_ptrs.as_ptr()) };
	let errno = Errno::last();
	child_report(program.name().to_bytes(), errno.desc().as_bytes());
	child_exit(if errno == Errno::ENOENT { EXIT_NOT_FOUND } else { EXIT_CANNOT_EXECUTE })
}

/// Forks one process per command, wired together with pipes. Processes that
/// were started before a failure stay in `job_builder`; every pipe end held
/// by the parent is closed by the time this returns.
pub fn spawn_commands(pipeline: &Pipeline, job_builder: &mut JobBuilder) -> Result<(), LaunchError> {
	let search = SearchPath::from_env();
	let programs: Vec<Program> = pipeline.commands.iter().map(|c| Program::prepare(&search, c)).collect::<Result<_, _>>()?;
	let input = pipeline.input.as_ref().map(Target::prepare).transpose()?;
	let output = pipeline.output.as_ref().map(Target::prepare).transpose()?;

	let last = programs.len() - 1;
	let table = wire(programs.len())?;
	for (i, (program, io)) in programs.iter().zip(table).enumerate() {
		match job_builder.push_fork().map_err(LaunchError::Fork)? {
			ForkResult::Parent{ child } => {
				debug!(pid = %child, stage = i, program = ?program.name(), "spawned");
				drop(io);
			},
			ForkResult::Child => {
				let input = if i == 0 { input.as_ref() } else { None };
				let output = if i == last { output.as_ref() } else { None };
				exec_command(program, io, input, output);
			},
		}
	}
	Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub enum EvalResult {
	/// Blank line.
	Nothing,
	/// Syntax error, already reported.
	Rejected,
	Exit,
	/// Foreground pipeline finished with this status.
	Done(i32),
	/// Background pipeline started; carries the leading pid.
	Background(Pid),
}

pub fn eval(state: &mut global::State, pipeline: &Pipeline) -> EvalResult {
	assert!(!pipeline.commands.is_empty());

	let disposition = if pipeline.is_background { Disposition::Background } else { Disposition::Foreground };
	run_job(state, pipeline, JobBuilder::new(pipeline.commands.len(), disposition))
}

fn run_job(state: &mut global::State, pipeline: &Pipeline, mut job_builder: JobBuilder) -> EvalResult {
	let launched = spawn_commands(pipeline, &mut job_builder);
	let job = job_builder.build();
	if let Err(e) = launched {
		warn!(error = %e, "launch failed");
		let _ = writeln!(&mut io::stderr(), "ish: {}", e);
		if let Some(mut job) = job {
			job.abandon();
			debug!(pids = ?job.pids(), "abandoned partially launched job");
		}
		return EvalResult::Done(EXIT_CANNOT_EXECUTE);
	}
	let mut job = match job {
		Some(job) => job,
		None => { return EvalResult::Done(EXIT_CANNOT_EXECUTE); },
	};
	match job.disposition {
		Disposition::Foreground => {
			let code = job.wait();
			debug!(pids = ?job.pids(), code = code, "foreground job done");
			EvalResult::Done(code)
		},
		Disposition::Background => {
			let leader = job.leader();
			state.reaper.adopt(job);
			EvalResult::Background(leader)
		},
	}
}

/// Tokenizes, parses and runs one input line.
pub fn eval_line(state: &mut global::State, line: &[u8]) -> EvalResult {
	let tokens = tokenizer::tokenize(line);
	match parser::parse(&tokens) {
		Ok(Parsed::Empty) => EvalResult::Nothing,
		Ok(Parsed::Exit) => EvalResult::Exit,
		Ok(Parsed::Pipeline(pipeline)) => eval(state, &pipeline),
		Err(e) => {
			let text = String::from_utf8_lossy(line);
			debug!(error = %e, line = %text.trim_end(), "rejected line");
			let _ = writeln!(&mut io::stderr(), "ish: syntax error: {}", e);
			EvalResult::Rejected
		},
	}
}
