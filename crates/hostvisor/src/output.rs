use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::logs::{self, Level, LogSink};

pub const DEFAULT_RECENT_LINES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLine {
	pub level: Level,
	pub text: String,
}

/// Keeps the most recent lines of a channel in memory and, optionally,
/// appends every line to a size-rotated log file.
#[derive(Clone)]
pub struct OutputCapture {
	recent: Arc<Mutex<VecDeque<CapturedLine>>>,
	capacity: usize,
	log_writer: Option<Arc<Mutex<LogWriter>>>,
}

struct LogWriter {
	file: Option<File>,
	path: PathBuf,
	bytes_written: u64,
	max_size: u64,
	log_dir: PathBuf,
	channel: String,
}

impl OutputCapture {
	pub fn in_memory(capacity: usize) -> Self {
		Self {
			recent: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
			capacity,
			log_writer: None,
		}
	}

	pub fn with_log_file(log_dir: &Path, channel: &str, max_log_size: u64) -> Self {
		let _ = fs::create_dir_all(log_dir);
		let path = log_dir.join(logs::current_log_name(channel));
		let file = open_append(&path);
		let bytes_written = file
			.as_ref()
			.and_then(|f| f.metadata().ok())
			.map(|m| m.len())
			.unwrap_or(0);

		Self {
			log_writer: Some(Arc::new(Mutex::new(LogWriter {
				file,
				path,
				bytes_written,
				max_size: max_log_size,
				log_dir: log_dir.to_path_buf(),
				channel: channel.to_string(),
			}))),
			..Self::in_memory(DEFAULT_RECENT_LINES)
		}
	}

	pub fn snapshot(&self) -> Vec<CapturedLine> {
		lock(&self.recent).iter().cloned().collect()
	}

	/// Text of the captured lines, oldest first.
	pub fn lines(&self) -> Vec<String> {
		lock(&self.recent).iter().map(|l| l.text.clone()).collect()
	}

	pub fn log_path(&self) -> Option<PathBuf> {
		self.log_writer.as_ref().map(|w| lock(w).path.clone())
	}
}

impl LogSink for OutputCapture {
	fn log(&self, level: Level, message: &str) {
		{
			let mut recent = lock(&self.recent);
			if self.capacity > 0 {
				if recent.len() >= self.capacity {
					recent.pop_front();
				}
				recent.push_back(CapturedLine {
					level,
					text: message.to_string(),
				});
			}
		}

		if let Some(writer) = &self.log_writer {
			lock(writer).write(format!("{:>5} {}\n", level.as_str(), message).as_bytes());
		}
	}
}

impl LogWriter {
	fn write(&mut self, data: &[u8]) {
		if let Some(ref mut file) = self.file {
			let _ = file.write_all(data);

			self.bytes_written += data.len() as u64;

			if self.bytes_written >= self.max_size {
				self.rotate();
			}
		}
	}

	fn rotate(&mut self) {
		drop(self.file.take());

		let rotated_path = self.log_dir.join(logs::rotated_log_name(&self.log_dir, &self.channel));
		let _ = fs::rename(&self.path, &rotated_path);

		self.path = self.log_dir.join(logs::current_log_name(&self.channel));
		self.file = open_append(&self.path);
		self.bytes_written = 0;
	}
}

fn open_append(path: &Path) -> Option<File> {
	OpenOptions::new().create(true).append(true).open(path).ok()
}

// A panicking sink must not silence the channel for everyone else.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
