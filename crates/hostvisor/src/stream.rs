use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// Read `reader` line by line on its own task until EOF, handing each line
/// (without its `\n` / `\r\n`) to `on_line`.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read,
/// so the child's pipe is always drained to the end.
pub fn spawn_line_reader<R, F>(reader: R, mut on_line: F) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
	F: FnMut(&str) + Send + 'static,
{
	tokio::spawn(async move {
		let mut reader = BufReader::new(reader);
		let mut buf = Vec::with_capacity(256);
		loop {
			buf.clear();
			match reader.read_until(b'\n', &mut buf).await {
				Ok(0) => break,
				Ok(_) => {
					let line = String::from_utf8_lossy(&buf);
					on_line(line.trim_end_matches(['\n', '\r']));
				}
				Err(_) => break,
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	async fn collect(input: &'static [u8]) -> Vec<String> {
		let lines = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&lines);
		spawn_line_reader(input, move |line| sink.lock().unwrap().push(line.to_string()))
			.await
			.unwrap();
		let collected = lines.lock().unwrap().clone();
		collected
	}

	#[tokio::test]
	async fn splits_lines_and_strips_endings() {
		assert_eq!(
			collect(b"first\r\nsecond\n\nlast without newline").await,
			vec!["first", "second", "", "last without newline"]
		);
	}

	#[tokio::test]
	async fn invalid_utf8_does_not_stop_reading() {
		let lines = collect(b"bad \xff byte\nstill here\n").await;
		assert_eq!(lines.len(), 2);
		assert!(lines[0].starts_with("bad "));
		assert_eq!(lines[1], "still here");
	}

	#[tokio::test]
	async fn empty_stream_yields_nothing() {
		assert!(collect(b"").await.is_empty());
	}
}
