use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

pub use tracing::Level;

const DATE: &[FormatItem<'static>] = format_description!("[year repr:last_two]-[month][day]");
const HOUR: &[FormatItem<'static>] = format_description!("[hour]");
const MINUTE: &[FormatItem<'static>] = format_description!("[minute]");

/// Destination for leveled, human-readable lines.
///
/// Implementations are called from stream-reader tasks and must not block
/// beyond the write itself.
pub trait LogSink: Send + Sync {
	fn log(&self, level: Level, message: &str);

	fn error(&self, message: &str) {
		self.log(Level::ERROR, message);
	}

	fn warn(&self, message: &str) {
		self.log(Level::WARN, message);
	}

	fn info(&self, message: &str) {
		self.log(Level::INFO, message);
	}
}

/// The three channels a supervisor writes to.
#[derive(Clone)]
pub struct LogChannels {
	/// The supervisor's own diagnostics.
	pub supervisor: Arc<dyn LogSink>,
	/// Lines the server writes to stdout that survive noise filtering.
	pub server_output: Arc<dyn LogSink>,
	/// Lines the server writes to stderr.
	pub server_errors: Arc<dyn LogSink>,
}

impl Default for LogChannels {
	fn default() -> Self {
		Self {
			supervisor: Arc::new(TracingSink::Supervisor),
			server_output: Arc::new(ConsoleSink),
			server_errors: Arc::new(TracingSink::Server),
		}
	}
}

macro_rules! emit {
	($target:literal, $level:expr, $message:expr) => {
		match $level {
			Level::ERROR => tracing::error!(target: $target, "{}", $message),
			Level::WARN => tracing::warn!(target: $target, "{}", $message),
			Level::INFO => tracing::info!(target: $target, "{}", $message),
			Level::DEBUG => tracing::debug!(target: $target, "{}", $message),
			_ => tracing::trace!(target: $target, "{}", $message),
		}
	};
}

/// Forwards to `tracing` under a fixed target per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingSink {
	Supervisor,
	Server,
}

impl LogSink for TracingSink {
	fn log(&self, level: Level, message: &str) {
		match self {
			TracingSink::Supervisor => emit!("hostvisor::supervisor", level, message),
			TracingSink::Server => emit!("hostvisor::server", level, message),
		}
	}
}

/// Writes lines verbatim to the supervising process's stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
	fn log(&self, _level: Level, message: &str) {
		println!("{}", message);
	}
}

/// Sends every line to each inner sink in order.
#[derive(Clone, Default)]
pub struct Tee(pub Vec<Arc<dyn LogSink>>);

impl LogSink for Tee {
	fn log(&self, level: Level, message: &str) {
		for sink in &self.0 {
			sink.log(level, message);
		}
	}
}

pub fn current_log_name(channel: &str) -> String {
	format!("{} {}.log", channel, now(DATE))
}

pub fn rotated_log_name(log_dir: &Path, channel: &str) -> String {
	let date = now(DATE);
	let hour = now(HOUR);
	let candidate = format!("{} {} {}.log", channel, date, hour);
	if log_dir.join(&candidate).exists() {
		format!("{} {} {}.{}.log", channel, date, hour, now(MINUTE))
	} else {
		candidate
	}
}

/// Remove capture files older than `max_age_days`, then the oldest ones until
/// at most `max_files` remain. Zero disables either limit.
pub fn expire_logs(log_dir: &Path, max_age_days: u32, max_files: u32) {
	let entries = match fs::read_dir(log_dir) {
		Ok(e) => e,
		Err(_) => return,
	};

	let mut log_files: Vec<(PathBuf, SystemTime)> = entries
		.flatten()
		.map(|entry| entry.path())
		.filter(|path| path.extension().and_then(|e| e.to_str()) == Some("log"))
		.map(|path| {
			let modified = path
				.metadata()
				.and_then(|m| m.modified())
				.unwrap_or(UNIX_EPOCH);
			(path, modified)
		})
		.collect();
	log_files.sort_by_key(|(_, modified)| *modified);

	if max_age_days > 0 {
		let max_age = Duration::from_secs(u64::from(max_age_days) * 86400);
		if let Some(cutoff) = SystemTime::now().checked_sub(max_age) {
			log_files.retain(|(path, modified)| {
				if *modified < cutoff {
					let _ = fs::remove_file(path);
					false
				} else {
					true
				}
			});
		}
	}

	if max_files > 0 && log_files.len() > max_files as usize {
		let excess = log_files.len() - max_files as usize;
		for (path, _) in log_files.drain(..excess) {
			let _ = fs::remove_file(path);
		}
	}
}

fn now(format: &[FormatItem<'_>]) -> String {
	OffsetDateTime::now_utc().format(format).unwrap_or_default()
}
