use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::config::ConfigSource;
use crate::env::Environment;
use crate::error::SupervisorError;
use crate::logs::LogChannels;
use crate::orphan::{self, Candidate, SweepReport};
use crate::process::{ProcessControl, ProcessHandle};
use crate::routing;
use crate::stream;
use crate::types::*;

/// Owns the lifecycle of one server process.
///
/// `start`, `stop` and `restart` are serialized: a caller arriving while
/// another lifecycle operation runs waits for it to finish. Accessors never
/// wait on a lifecycle operation.
pub struct Supervisor {
	config: Arc<dyn ConfigSource>,
	env: Arc<dyn Environment>,
	control: Arc<dyn ProcessControl>,
	logs: LogChannels,
	lifecycle: tokio::sync::Mutex<()>,
	status: Arc<Mutex<Status>>,
}

#[derive(Debug, Clone, Copy)]
struct Status {
	pid: u32,
	started: bool,
	state: ProcessState,
}

impl Supervisor {
	pub fn new(
		config: Arc<dyn ConfigSource>,
		env: Arc<dyn Environment>,
		control: Arc<dyn ProcessControl>,
		logs: LogChannels,
	) -> Arc<Self> {
		Arc::new(Self {
			config,
			env,
			control,
			logs,
			lifecycle: tokio::sync::Mutex::new(()),
			status: Arc::new(Mutex::new(Status {
				pid: 0,
				started: false,
				state: ProcessState::Stopped,
			})),
		})
	}

	pub fn app_url(&self) -> String {
		format!("http://localhost:{}/", self.config.port())
	}

	/// Pid of the last spawned server, `0` before the first start.
	pub fn process_id(&self) -> u32 {
		lock(&self.status).pid
	}

	/// True once a start has succeeded, until the next restart. Not a liveness probe.
	pub fn started(&self) -> bool {
		lock(&self.status).started
	}

	pub fn state(&self) -> ProcessState {
		lock(&self.status).state
	}

	pub fn launch_spec(&self) -> LaunchSpec {
		let config_path = self.config.server_config_path();
		let app_root = self.env.app_root();

		let mut env = self.config.extra_env();
		env.insert(APP_ROOT_ENV.to_string(), app_root.display().to_string());
		env.insert(PARENT_PID_ENV.to_string(), self.env.current_pid().to_string());

		LaunchSpec {
			executable: self.config.executable_path(),
			args: self.config.launch_args(&config_path),
			working_dir: app_root,
			env,
			capture_stdout: true,
			capture_stderr: true,
			headless: true,
		}
	}

	/// Launch the server. Only a spawn failure is returned; a failed config
	/// update is logged and the existing config file is used.
	pub async fn start(&self) -> Result<(), SupervisorError> {
		let _guard = self.lifecycle.lock().await;
		self.start_locked()
	}

	/// Kill the tracked server, then every orphaned copy of its executable.
	/// Failures are logged and reported, never raised.
	pub async fn stop(&self) -> SweepReport {
		let _guard = self.lifecycle.lock().await;
		self.stop_locked()
	}

	pub async fn restart(&self) -> Result<(), SupervisorError> {
		let _guard = self.lifecycle.lock().await;
		self.update(|s| s.started = false);
		self.logs.supervisor.warn("attempting to restart server");
		self.stop_locked();
		self.start_locked()
	}

	/// Kill orphaned copies of the executable without touching the tracked pid.
	pub async fn sweep_orphans(&self) -> SweepReport {
		let _guard = self.lifecycle.lock().await;
		let tracked = match self.state() {
			ProcessState::Running { pid } => Some(pid),
			_ => None,
		};
		self.sweep(tracked)
	}

	/// Running copies of the executable and whether a sweep would kill them.
	pub fn survey(&self) -> Result<Vec<Candidate>, SupervisorError> {
		orphan::survey(&*self.control, &self.config.executable_path())
	}

	fn start_locked(&self) -> Result<(), SupervisorError> {
		if let ProcessState::Running { pid } = self.state() {
			self.logs
				.supervisor
				.warn(&format!("server already running (pid {}), not starting another", pid));
			return Ok(());
		}

		self.logs.supervisor.info("preparing server");
		self.update(|s| s.state = ProcessState::Starting);

		let spec = self.launch_spec();
		let config_path = self.config.server_config_path();
		let updated = self
			.config
			.update_server_config(&config_path)
			.map_err(|source| SupervisorError::ConfigUpdate { path: config_path, source });
		self.settle(updated)?;

		let mut handle = match self.control.spawn(&spec) {
			Ok(handle) => handle,
			Err(source) => {
				self.update(|s| s.state = ProcessState::Stopped);
				return self.settle(Err(SupervisorError::Spawn {
					executable: spec.executable,
					source,
				}));
			}
		};

		let pid = handle.pid;
		self.update(|s| {
			s.pid = pid;
			s.started = true;
			s.state = ProcessState::Running { pid };
		});
		self.attach_streams(&mut handle);
		if let Some(exited) = handle.exited.take() {
			self.watch_exit(pid, exited);
		}

		self.logs
			.supervisor
			.info(&format!("server started (pid {}) at {}", pid, self.app_url()));
		Ok(())
	}

	fn stop_locked(&self) -> SweepReport {
		let pid = self.process_id();
		self.logs.supervisor.info(&format!("stopping server (pid {})", pid));

		let killed = self
			.control
			.kill(pid)
			.map_err(|source| SupervisorError::Kill { pid, source });
		let _ = self.settle(killed);

		// already signalled above, the sweep only goes after the others
		let report = self.sweep(Some(pid).filter(|&pid| pid != 0));
		self.update(|s| s.state = ProcessState::Stopped);
		report
	}

	fn sweep(&self, tracked: Option<u32>) -> SweepReport {
		orphan::sweep(
			&*self.control,
			&self.config.executable_path(),
			tracked,
			&*self.logs.supervisor,
		)
	}

	/// The one place failures are judged: recoverable ones are logged and
	/// swallowed, fatal ones are logged and handed back.
	fn settle(&self, result: Result<(), SupervisorError>) -> Result<(), SupervisorError> {
		match result {
			Ok(()) => Ok(()),
			Err(e) if e.is_fatal() => {
				self.logs.supervisor.error(&e.to_string());
				Err(e)
			}
			Err(e) => {
				self.logs.supervisor.error(&e.to_string());
				Ok(())
			}
		}
	}

	fn attach_streams(&self, handle: &mut ProcessHandle) {
		if let Some(stdout) = handle.stdout.take() {
			let channels = self.logs.clone();
			stream::spawn_line_reader(stdout, move |line| routing::route_stdout(&channels, line));
		}
		if let Some(stderr) = handle.stderr.take() {
			let channels = self.logs.clone();
			stream::spawn_line_reader(stderr, move |line| routing::route_stderr(&channels, line));
		}
	}

	fn watch_exit(&self, pid: u32, exited: JoinHandle<Option<i32>>) {
		let status = Arc::clone(&self.status);
		let log = Arc::clone(&self.logs.supervisor);
		tokio::spawn(async move {
			match exited.await.ok().flatten() {
				Some(code) => log.info(&format!("server (pid {}) exited with code {}", pid, code)),
				None => log.info(&format!("server (pid {}) was terminated", pid)),
			}
			let mut status = lock(&status);
			if matches!(status.state, ProcessState::Running { pid: running } if running == pid) {
				status.state = ProcessState::Stopped;
			}
		});
	}

	fn update(&self, f: impl FnOnce(&mut Status)) {
		f(&mut lock(&self.status));
	}
}

fn lock(status: &Mutex<Status>) -> MutexGuard<'_, Status> {
	status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
