//! Finding and killing copies of the supervised executable that the
//! supervisor no longer tracks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PathError, SupervisorError};
use crate::logs::LogSink;
use crate::path::{base_name, NormalizedPath};
use crate::process::ProcessControl;
use crate::types::ProcessInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
	/// Started from the supervised executable.
	Orphan,
	DifferentPath,
	/// The start path was unavailable or could not be normalized.
	Unresolvable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	pub info: ProcessInfo,
	pub verdict: Verdict,
}

/// Outcome of one sweep. Failures are collected, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
	pub killed: Vec<u32>,
	pub skipped: Vec<u32>,
	pub failed: Vec<(u32, String)>,
	/// Set when the sweep could not enumerate candidates at all.
	pub aborted: Option<String>,
}

impl SweepReport {
	pub fn is_clean(&self) -> bool {
		self.failed.is_empty() && self.aborted.is_none()
	}
}

/// `path` with symlinks resolved when it exists on this machine, as written
/// otherwise. The OS reports start paths already resolved.
fn on_disk(path: &Path) -> PathBuf {
	fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn classify(info: &ProcessInfo, target: &NormalizedPath) -> Verdict {
	let Some(path) = &info.start_path else {
		return Verdict::Unresolvable("start path unavailable".to_string());
	};
	match NormalizedPath::from_path(&on_disk(path)) {
		Ok(candidate) if &candidate == target => Verdict::Orphan,
		Ok(_) => Verdict::DifferentPath,
		Err(e) => Verdict::Unresolvable(e.to_string()),
	}
}

/// List running processes named like `executable` and classify each one
/// against it, without killing anything.
///
/// When `executable` is a symlink, processes named after its target are
/// listed too.
pub fn survey(
	control: &dyn ProcessControl,
	executable: &Path,
) -> Result<Vec<Candidate>, SupervisorError> {
	let resolved = on_disk(executable);
	let target = NormalizedPath::from_path(&resolved)?;

	let mut names = vec![file_name(executable)?];
	let resolved_name = file_name(&resolved)?;
	if !names.contains(&resolved_name) {
		names.push(resolved_name);
	}

	let mut processes = Vec::new();
	for name in names {
		let found = control
			.processes_by_name(&name)
			.map_err(|source| SupervisorError::Enumerate { name, source })?;
		processes.extend(found);
	}
	processes.sort_by_key(|info| info.pid);
	processes.dedup_by_key(|info| info.pid);

	Ok(processes
		.into_iter()
		.map(|info| {
			let verdict = classify(&info, &target);
			Candidate { info, verdict }
		})
		.collect())
}

fn file_name(path: &Path) -> Result<String, PathError> {
	let shown = path.to_string_lossy();
	base_name(&shown)
		.map(str::to_string)
		.ok_or_else(|| PathError::NoFileName(shown.to_string()))
}

/// Kill every running copy of `executable` other than `tracked`, the pid the
/// supervisor already owns. Each candidate is handled on its own; one failure
/// never stops the rest.
pub fn sweep(
	control: &dyn ProcessControl,
	executable: &Path,
	tracked: Option<u32>,
	log: &dyn LogSink,
) -> SweepReport {
	let mut report = SweepReport::default();

	log.info("finding orphaned server processes");
	let candidates = match survey(control, executable) {
		Ok(c) => c,
		Err(e) => {
			log.error(&format!("orphan sweep aborted: {}", e));
			report.aborted = Some(e.to_string());
			return report;
		}
	};

	for Candidate { info, verdict } in candidates {
		let pid = info.pid;
		let shown = info
			.start_path
			.as_deref()
			.map(|p| p.display().to_string())
			.unwrap_or_else(|| "<unknown>".to_string());
		log.info(&format!("[{}] server process found. path: {}", pid, shown));

		if tracked == Some(pid) {
			log.info(&format!("[{}] process is the supervised server, not an orphan", pid));
			continue;
		}

		match verdict {
			Verdict::Orphan => {
				log.info(&format!("[{}] process is considered orphaned", pid));
				match control.kill(pid) {
					Ok(()) => report.killed.push(pid),
					Err(source) => {
						let err = SupervisorError::Kill { pid, source };
						log.error(&err.to_string());
						report.failed.push((pid, err.to_string()));
					}
				}
			}
			Verdict::DifferentPath => {
				log.info(&format!("[{}] process has a different start-up path, skipping", pid));
				report.skipped.push(pid);
			}
			Verdict::Unresolvable(reason) => {
				log.warn(&format!("[{}] cannot resolve start path ({}), skipping", pid, reason));
				report.failed.push((pid, reason));
			}
		}
	}

	report
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::output::OutputCapture;
	use crate::process::ProcessHandle;
	use crate::types::LaunchSpec;
	use std::collections::HashSet;
	use std::io;
	use std::path::PathBuf;
	use std::sync::Mutex;

	#[derive(Default)]
	struct FakeControl {
		running: Vec<ProcessInfo>,
		refuse_kill: HashSet<u32>,
		list_error: bool,
		killed: Mutex<Vec<u32>>,
		asked_for: Mutex<Vec<String>>,
	}

	impl FakeControl {
		fn with(paths: &[(u32, Option<&str>)]) -> Self {
			Self {
				running: paths
					.iter()
					.map(|(pid, path)| ProcessInfo {
						pid: *pid,
						name: "srv.exe".into(),
						start_path: path.map(PathBuf::from),
					})
					.collect(),
				..Self::default()
			}
		}

		fn killed(&self) -> Vec<u32> {
			self.killed.lock().unwrap().clone()
		}
	}

	impl ProcessControl for FakeControl {
		fn spawn(&self, _spec: &LaunchSpec) -> io::Result<ProcessHandle> {
			unreachable!("sweeps never spawn")
		}

		fn kill(&self, pid: u32) -> io::Result<()> {
			if self.refuse_kill.contains(&pid) {
				return Err(io::Error::from(io::ErrorKind::PermissionDenied));
			}
			self.killed.lock().unwrap().push(pid);
			Ok(())
		}

		fn processes_by_name(&self, name: &str) -> io::Result<Vec<ProcessInfo>> {
			self.asked_for.lock().unwrap().push(name.to_string());
			if self.list_error {
				return Err(io::Error::new(io::ErrorKind::Other, "process table unavailable"));
			}
			Ok(self.running.clone())
		}
	}

	const EXE: &str = r"C:\App\srv.exe";

	#[test]
	fn kills_only_matching_paths() {
		let control = FakeControl::with(&[
			(10, Some(r"C:\Other\srv.exe")),
			(11, Some(r"C:\App\srv.exe")),
			(12, Some(r"D:\App\srv.exe")),
		]);
		let log = OutputCapture::in_memory(64);
		let report = sweep(&control, Path::new(EXE), None, &log);

		assert_eq!(control.killed(), vec![11]);
		assert_eq!(report.killed, vec![11]);
		assert_eq!(report.skipped, vec![10, 12]);
		assert!(report.is_clean());
		assert_eq!(*control.asked_for.lock().unwrap(), vec!["srv.exe".to_string()]);
	}

	#[test]
	fn equivalent_spellings_are_both_killed() {
		let control = FakeControl::with(&[
			(21, Some(r"C:\App\srv.exe")),
			(22, Some(r"c:\app\srv.exe\")),
		]);
		let report = sweep(&control, Path::new(EXE), None, &OutputCapture::in_memory(64));
		assert_eq!(report.killed, vec![21, 22]);
		assert!(report.skipped.is_empty());
	}

	#[test]
	fn kill_failure_does_not_stop_the_sweep() {
		let mut control = FakeControl::with(&[
			(31, Some(EXE)),
			(32, Some(EXE)),
			(33, Some(EXE)),
		]);
		control.refuse_kill.insert(32);
		let log = OutputCapture::in_memory(64);
		let report = sweep(&control, Path::new(EXE), None, &log);

		assert_eq!(report.killed, vec![31, 33]);
		assert_eq!(report.failed.len(), 1);
		assert_eq!(report.failed[0].0, 32);
		assert!(log.lines().iter().any(|l| l.starts_with("failed to kill pid 32")));
	}

	#[test]
	fn unresolvable_paths_are_isolated() {
		let control = FakeControl::with(&[(41, None), (42, Some("   ")), (43, Some(EXE))]);
		let report = sweep(&control, Path::new(EXE), None, &OutputCapture::in_memory(64));

		assert_eq!(report.killed, vec![43]);
		let failed: Vec<u32> = report.failed.iter().map(|(pid, _)| *pid).collect();
		assert_eq!(failed, vec![41, 42]);
	}

	#[test]
	fn enumeration_failure_aborts_only_the_sweep() {
		let mut control = FakeControl::with(&[(51, Some(EXE))]);
		control.list_error = true;
		let log = OutputCapture::in_memory(64);
		let report = sweep(&control, Path::new(EXE), None, &log);

		assert!(report.aborted.is_some());
		assert!(control.killed().is_empty());
		assert!(log.lines().iter().any(|l| l.starts_with("orphan sweep aborted")));
	}

	#[test]
	fn every_decision_is_logged() {
		let control = FakeControl::with(&[(61, Some(EXE)), (62, Some(r"C:\Elsewhere\srv.exe"))]);
		let log = OutputCapture::in_memory(64);
		sweep(&control, Path::new(EXE), None, &log);

		let lines = log.lines();
		assert!(lines.contains(&"[61] process is considered orphaned".to_string()));
		assert!(lines.contains(&"[62] process has a different start-up path, skipping".to_string()));
	}

	#[test]
	fn survey_classifies_without_killing() {
		let control = FakeControl::with(&[(71, Some(EXE)), (72, Some(r"\\Server\Share\srv.exe"))]);
		let candidates = survey(&control, Path::new(EXE)).unwrap();

		assert_eq!(candidates[0].verdict, Verdict::Orphan);
		assert_eq!(candidates[1].verdict, Verdict::DifferentPath);
		assert!(control.killed().is_empty());
	}

	#[test]
	fn unc_executable_is_case_sensitive() {
		let exe = r"\\Server\Share\srv.exe";
		let control = FakeControl::with(&[
			(81, Some(r"\\Server\Share\srv.exe ")),
			(82, Some(r"\\server\share\srv.exe")),
		]);
		let report = sweep(&control, Path::new(exe), None, &OutputCapture::in_memory(64));
		assert_eq!(report.killed, vec![81]);
		assert_eq!(report.skipped, vec![82]);
	}

	#[test]
	fn tracked_pid_is_not_an_orphan() {
		let control = FakeControl::with(&[(91, Some(EXE)), (92, Some(EXE))]);
		let log = OutputCapture::in_memory(64);
		let report = sweep(&control, Path::new(EXE), Some(91), &log);

		assert_eq!(control.killed(), vec![92]);
		assert_eq!(report.killed, vec![92]);
		assert!(report.skipped.is_empty());
		assert!(log
			.lines()
			.contains(&"[91] process is the supervised server, not an orphan".to_string()));
	}

	#[test]
	fn symlinked_executable_matches_its_target() {
		let dir = tempfile::tempdir().unwrap();
		let real = dir.path().join("real-srv");
		fs::write(&real, b"").unwrap();
		let link = dir.path().join("srv-link");
		std::os::unix::fs::symlink(&real, &link).unwrap();
		let reported = fs::canonicalize(&real).unwrap();

		let mut control = FakeControl::default();
		control.running = vec![ProcessInfo {
			pid: 101,
			name: "srv-link".into(),
			start_path: Some(reported),
		}];
		let candidates = survey(&control, &link).unwrap();

		assert_eq!(candidates.len(), 1);
		assert_eq!(candidates[0].verdict, Verdict::Orphan);
		assert_eq!(
			*control.asked_for.lock().unwrap(),
			vec!["srv-link".to_string(), "real-srv".to_string()]
		);
	}

	#[test]
	fn doubled_leading_slash_of_an_existing_file_is_local() {
		let dir = tempfile::tempdir().unwrap();
		let real = fs::canonicalize(dir.path()).unwrap().join("srv");
		fs::write(&real, b"").unwrap();
		let doubled = PathBuf::from(format!("/{}", real.display()));

		let control = FakeControl::with(&[(111, Some(&*real.to_string_lossy()))]);
		let candidates = survey(&control, &doubled).unwrap();
		assert_eq!(candidates[0].verdict, Verdict::Orphan);
	}

	#[tokio::test]
	async fn copy_started_through_a_symlink_is_found() {
		use crate::process::OsProcessControl;
		use std::collections::BTreeMap;
		use std::time::Duration;

		let dir = tempfile::tempdir().unwrap();
		let link = dir.path().join("hv-linked-srv");
		std::os::unix::fs::symlink("/bin/sleep", &link).unwrap();

		let control = OsProcessControl::new(Duration::from_millis(100));
		let mut handle = control
			.spawn(&LaunchSpec {
				executable: link.clone(),
				args: vec!["30".into()],
				working_dir: dir.path().to_path_buf(),
				env: BTreeMap::new(),
				capture_stdout: false,
				capture_stderr: false,
				headless: true,
			})
			.unwrap();
		tokio::time::sleep(Duration::from_millis(200)).await;

		let candidates = survey(&control, &link).unwrap();
		let verdict = candidates
			.iter()
			.find(|c| c.info.pid == handle.pid)
			.map(|c| c.verdict.clone());

		control.kill(handle.pid).unwrap();
		let _ = handle.exited.take().unwrap().await;

		assert_eq!(verdict, Some(Verdict::Orphan), "candidates: {:?}", candidates);
	}
}
