use std::collections::BTreeMap;
use std::path::PathBuf;

/// Environment variable carrying the application root into the child.
pub const APP_ROOT_ENV: &str = "HOSTVISOR_APP_ROOT";
/// Environment variable carrying the supervising process id into the child.
pub const PARENT_PID_ENV: &str = "HOSTVISOR_PARENT_PID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
	Stopped,
	Starting,
	Running { pid: u32 },
}

impl ProcessState {
	pub fn is_running(&self) -> bool {
		matches!(self, ProcessState::Running { .. })
	}
}

/// Everything needed to launch the server once. Built fresh on every start.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
	pub executable: PathBuf,
	pub args: Vec<String>,
	pub working_dir: PathBuf,
	pub env: BTreeMap<String, String>,
	pub capture_stdout: bool,
	pub capture_stderr: bool,
	/// Detach stdin so the child never waits on the parent's terminal.
	pub headless: bool,
}

/// Read-only view of a running process, as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
	pub pid: u32,
	pub name: String,
	/// `None` when the OS would not tell us where the process was started from.
	pub start_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_running_is_running() {
		assert!(ProcessState::Running { pid: 9 }.is_running());
		assert!(!ProcessState::Starting.is_running());
		assert!(!ProcessState::Stopped.is_running());
	}
}
