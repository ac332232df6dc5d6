use std::io;
use std::path::PathBuf;

/// Facts about the supervising process that the child is told about.
pub trait Environment: Send + Sync {
	/// Absolute path of the application's install/run directory.
	fn app_root(&self) -> PathBuf;
	fn current_pid(&self) -> u32;
}

#[derive(Debug, Clone)]
pub struct SystemEnvironment {
	app_root: PathBuf,
}

impl SystemEnvironment {
	pub fn new(app_root: impl Into<PathBuf>) -> Self {
		Self {
			app_root: app_root.into(),
		}
	}

	/// Use the directory holding the running binary as the application root.
	pub fn from_current_exe() -> io::Result<Self> {
		let exe = std::env::current_exe()?;
		let dir = exe
			.parent()
			.map(PathBuf::from)
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"))?;
		Ok(Self::new(dir))
	}
}

impl Environment for SystemEnvironment {
	fn app_root(&self) -> PathBuf {
		self.app_root.clone()
	}

	fn current_pid(&self) -> u32 {
		std::process::id()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reports_own_pid_and_root() {
		let env = SystemEnvironment::new("/opt/app");
		assert_eq!(env.app_root(), PathBuf::from("/opt/app"));
		assert_eq!(env.current_pid(), std::process::id());
	}

	#[test]
	fn root_from_current_exe_is_a_directory() {
		let env = SystemEnvironment::from_current_exe().unwrap();
		assert!(env.app_root().is_dir());
	}
}
