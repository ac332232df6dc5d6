//! # hostvisor
//!
//! Supervisor for a single local HTTP host process.
//!
//! Launches the server with a freshly rendered config file, routes its
//! stdout/stderr to log channels, and stops it again, including copies of
//! the same executable left running by an earlier supervisor that lost
//! track of them.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use hostvisor::{LogChannels, OsProcessControl, Settings, Supervisor, SystemEnvironment};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let settings = Settings::load(Path::new("/etc/hostvisor/config.toml")).unwrap();
//! let env = SystemEnvironment::new(settings.app_root());
//! let sup = Supervisor::new(
//!     Arc::new(settings),
//!     Arc::new(env),
//!     Arc::new(OsProcessControl::default()),
//!     LogChannels::default(),
//! );
//!
//! sup.start().await.unwrap();
//! println!("serving at {}", sup.app_url());
//! sup.stop().await;
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod logs;
pub mod orphan;
pub mod output;
pub mod path;
pub mod process;
pub mod routing;
pub mod stream;
pub mod supervisor;
pub mod types;

pub use config::{ConfigSource, Settings};
pub use env::{Environment, SystemEnvironment};
pub use error::{ConfigError, PathError, Severity, SupervisorError};
pub use logs::{LogChannels, LogSink};
pub use orphan::{Candidate, SweepReport, Verdict};
pub use output::OutputCapture;
pub use path::NormalizedPath;
pub use process::{OsProcessControl, ProcessControl, ProcessHandle};
pub use supervisor::Supervisor;
pub use types::*;
