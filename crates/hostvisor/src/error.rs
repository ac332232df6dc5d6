use std::io;
use std::path::PathBuf;

/// How a failure propagates out of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
	/// Logged and absorbed; the operation carries on.
	Recoverable,
	/// Returned to the caller; the operation stops.
	Fatal,
}

/// Rejection from [`NormalizedPath`](crate::path::NormalizedPath).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
	#[error("path can not be null or empty")]
	Blank,
	#[error("{0:?} does not name a file")]
	NoFileName(String),
	#[error("cannot qualify relative path {path:?}: {reason}")]
	Unqualified { path: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to parse {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
	#[error("failed to update server config {}: {source}", path.display())]
	ConfigUpdate {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to spawn {}: {source}", executable.display())]
	Spawn {
		executable: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to kill pid {pid}: {source}")]
	Kill {
		pid: u32,
		#[source]
		source: io::Error,
	},
	#[error("failed to list processes named {name}: {source}")]
	Enumerate {
		name: String,
		#[source]
		source: io::Error,
	},
	#[error("invalid path: {0}")]
	InvalidPath(#[from] PathError),
}

impl SupervisorError {
	pub fn severity(&self) -> Severity {
		match self {
			SupervisorError::Spawn { .. } => Severity::Fatal,
			SupervisorError::ConfigUpdate { .. }
			| SupervisorError::Kill { .. }
			| SupervisorError::Enumerate { .. }
			| SupervisorError::InvalidPath(_) => Severity::Recoverable,
		}
	}

	pub fn is_fatal(&self) -> bool {
		self.severity() == Severity::Fatal
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_spawn_is_fatal() {
		let spawn = SupervisorError::Spawn {
			executable: "/opt/host/srv".into(),
			source: io::Error::from(io::ErrorKind::NotFound),
		};
		let update = SupervisorError::ConfigUpdate {
			path: "/opt/host/host.toml".into(),
			source: io::Error::from(io::ErrorKind::PermissionDenied),
		};
		assert!(spawn.is_fatal());
		assert_eq!(update.severity(), Severity::Recoverable);
		assert_eq!(
			SupervisorError::from(PathError::Blank).severity(),
			Severity::Recoverable
		);
	}

	#[test]
	fn messages_name_the_subject() {
		let err = SupervisorError::Kill {
			pid: 77,
			source: io::Error::from(io::ErrorKind::PermissionDenied),
		};
		assert!(err.to_string().starts_with("failed to kill pid 77"));
		assert_eq!(PathError::Blank.to_string(), "path can not be null or empty");
	}
}
