use std::sync::Arc;
use std::time::Duration;

use hostvisor::config::LogsConfig;
use hostvisor::logs::{self, ConsoleSink, LogChannels, LogSink, Tee, TracingSink};
use hostvisor::OutputCapture;

const EXPIRY_INTERVAL: Duration = Duration::from_secs(3600);

/// Log channels for the binary. With a log directory configured every
/// channel is also captured to its own rotated file, and old files are
/// expired now and hourly.
pub fn build(config: &LogsConfig) -> LogChannels {
	let Some(dir) = config.dir.clone() else {
		return LogChannels::default();
	};

	logs::expire_logs(&dir, config.max_age_days, config.max_files);
	{
		let dir = dir.clone();
		let (max_age_days, max_files) = (config.max_age_days, config.max_files);
		tokio::spawn(async move {
			loop {
				tokio::time::sleep(EXPIRY_INTERVAL).await;
				logs::expire_logs(&dir, max_age_days, max_files);
			}
		});
	}

	let capture = |channel: &str| -> Arc<dyn LogSink> {
		Arc::new(OutputCapture::with_log_file(&dir, channel, config.max_size_bytes))
	};

	LogChannels {
		supervisor: Arc::new(Tee(vec![Arc::new(TracingSink::Supervisor), capture("supervisor")])),
		server_output: Arc::new(Tee(vec![Arc::new(ConsoleSink), capture("server")])),
		server_errors: Arc::new(Tee(vec![Arc::new(TracingSink::Server), capture("server-errors")])),
	}
}

pub fn init_tracing(level: &str) {
	let parsed = level.parse::<tracing::Level>();
	// stdout belongs to the server's own output
	tracing_subscriber::fmt()
		.with_max_level(*parsed.as_ref().unwrap_or(&tracing::Level::INFO))
		.with_writer(std::io::stderr)
		.init();
	if parsed.is_err() {
		tracing::warn!("unknown log level {:?}, using INFO", level);
	}
}
