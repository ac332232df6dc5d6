use std::ffi::{OsStr, OsString};
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::types::{LaunchSpec, ProcessInfo};

pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(3);

pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// A freshly spawned process.
pub struct ProcessHandle {
	pub pid: u32,
	pub stdout: Option<OutputStream>,
	pub stderr: Option<OutputStream>,
	/// Resolves with the exit code once the process has been reaped
	/// (`None` when it was killed by a signal).
	pub exited: Option<JoinHandle<Option<i32>>>,
}

/// Spawn, enumerate and kill OS processes.
pub trait ProcessControl: Send + Sync {
	fn spawn(&self, spec: &LaunchSpec) -> io::Result<ProcessHandle>;

	/// Terminate `pid`. A pid that does not exist is not an error.
	fn kill(&self, pid: u32) -> io::Result<()>;

	/// Every running process whose name, or executable file name, is `name`.
	fn processes_by_name(&self, name: &str) -> io::Result<Vec<ProcessInfo>>;
}

/// [`ProcessControl`] backed by tokio, `nix` signals and `sysinfo`.
#[derive(Debug, Clone)]
pub struct OsProcessControl {
	kill_grace: Duration,
}

impl Default for OsProcessControl {
	fn default() -> Self {
		Self::new(DEFAULT_KILL_GRACE)
	}
}

impl OsProcessControl {
	/// `kill_grace` is how long a process gets after SIGTERM before SIGKILL.
	pub fn new(kill_grace: Duration) -> Self {
		Self { kill_grace }
	}
}

impl ProcessControl for OsProcessControl {
	fn spawn(&self, spec: &LaunchSpec) -> io::Result<ProcessHandle> {
		let mut cmd = Command::new(&spec.executable);
		cmd.args(&spec.args)
			.current_dir(&spec.working_dir)
			.envs(&spec.env)
			.stdin(if spec.headless { Stdio::null() } else { Stdio::inherit() })
			.stdout(piped_if(spec.capture_stdout))
			.stderr(piped_if(spec.capture_stderr));

		let mut child = cmd.spawn()?;
		let pid = child.id().unwrap_or(0);
		let stdout = child.stdout.take().map(|s| Box::new(s) as OutputStream);
		let stderr = child.stderr.take().map(|s| Box::new(s) as OutputStream);
		let exited = tokio::spawn(async move { child.wait().await.ok().and_then(|s| s.code()) });

		Ok(ProcessHandle {
			pid,
			stdout,
			stderr,
			exited: Some(exited),
		})
	}

	fn kill(&self, pid: u32) -> io::Result<()> {
		// 0 would signal our own process group
		let Some(target) = i32::try_from(pid).ok().filter(|&raw| raw > 0).map(Pid::from_raw) else {
			return Ok(());
		};

		let signalled = incarnation(pid);
		match kill(target, Signal::SIGTERM) {
			Ok(()) => {}
			Err(Errno::ESRCH) => return Ok(()),
			Err(e) => return Err(io::Error::from(e)),
		}

		// without an identity to compare against, a reused pid can't be told apart
		let Some(signalled) = signalled else {
			return Ok(());
		};
		let grace = self.kill_grace;
		std::thread::spawn(move || {
			std::thread::sleep(grace);
			kill_if_same(pid, &signalled);
		});
		Ok(())
	}

	fn processes_by_name(&self, name: &str) -> io::Result<Vec<ProcessInfo>> {
		let mut system = System::new();
		system.refresh_processes_specifics(
			ProcessesToUpdate::All,
			true,
			ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
		);

		let wanted = OsStr::new(name);
		let mut found: Vec<ProcessInfo> = system
			.processes()
			.values()
			.filter(|p| p.thread_kind().is_none())
			.filter(|p| p.name() == wanted || p.exe().and_then(Path::file_name) == Some(wanted))
			.map(|p| ProcessInfo {
				pid: p.pid().as_u32(),
				name: p.name().to_string_lossy().into_owned(),
				start_path: p.exe().map(Path::to_path_buf),
			})
			.collect();
		found.sort_by_key(|info| info.pid);
		Ok(found)
	}
}

/// Tells one process apart from a later one that was handed the same pid.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Incarnation {
	start_time: u64,
	name: OsString,
}

fn incarnation(pid: u32) -> Option<Incarnation> {
	let pid = sysinfo::Pid::from_u32(pid);
	let mut system = System::new();
	system.refresh_processes_specifics(
		ProcessesToUpdate::Some(&[pid]),
		true,
		ProcessRefreshKind::new(),
	);
	system.process(pid).map(|p| Incarnation {
		start_time: p.start_time(),
		name: p.name().to_os_string(),
	})
}

/// SIGKILL `pid` only while it is still the process that got SIGTERM.
fn kill_if_same(pid: u32, signalled: &Incarnation) -> bool {
	if incarnation(pid).as_ref() != Some(signalled) {
		return false;
	}
	let Ok(raw) = i32::try_from(pid) else {
		return false;
	};
	kill(Pid::from_raw(raw), Signal::SIGKILL).is_ok()
}

fn piped_if(capture: bool) -> Stdio {
	if capture {
		Stdio::piped()
	} else {
		Stdio::null()
	}
}
