//! Where the server's stdout and stderr lines end up.

use crate::logs::{LogChannels, Level};

/// Per-request chatter and the host's heartbeat; never forwarded.
const NOISE_PREFIXES: &[&str] = &["Request started:", "Request ended:"];
const HEARTBEAT: &str = "IncrementMessages called";

pub fn is_noise(line: &str) -> bool {
	line == HEARTBEAT || NOISE_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

/// Forward a stdout line to the server output channel unless it is blank or noise.
pub fn route_stdout(channels: &LogChannels, line: &str) {
	if line.trim().is_empty() || is_noise(line) {
		return;
	}
	channels.server_output.log(Level::INFO, line);
}

/// Forward a non-blank stderr line to the server error channel.
pub fn route_stderr(channels: &LogChannels, line: &str) {
	if line.trim().is_empty() {
		return;
	}
	channels.server_errors.log(Level::ERROR, line);
}
