use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 8989;

/// Where the supervisor learns what to launch and how the server is configured.
pub trait ConfigSource: Send + Sync {
	fn executable_path(&self) -> PathBuf;
	fn server_config_path(&self) -> PathBuf;
	fn port(&self) -> u16;

	/// Rewrite the server's own config file at `path` for the current settings.
	fn update_server_config(&self, path: &Path) -> io::Result<()>;

	/// Command-line arguments pointing the server at `config_path`.
	fn launch_args(&self, config_path: &Path) -> Vec<String> {
		vec![format!("--config={}", config_path.display())]
	}

	/// Extra environment variables for the server, applied before the
	/// supervisor's own.
	fn extra_env(&self) -> BTreeMap<String, String> {
		BTreeMap::new()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	pub server: ServerConfig,
	#[serde(default)]
	pub app: AppConfig,
	#[serde(default)]
	pub logs: LogsConfig,
	#[serde(default)]
	pub process: ProcessConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	pub executable: PathBuf,
	pub config_path: PathBuf,
	/// Rendered into `config_path` before every start when set.
	pub config_template: Option<PathBuf>,
	#[serde(default = "default_args")]
	pub args: Vec<String>,
	#[serde(default = "default_port")]
	pub port: u16,
	#[serde(default)]
	pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
	pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
	pub dir: Option<PathBuf>,
	#[serde(default = "default_max_size")]
	pub max_size_bytes: u64,
	#[serde(default = "default_max_age_days")]
	pub max_age_days: u32,
	#[serde(default = "default_max_files")]
	pub max_files: u32,
	#[serde(default = "default_level")]
	pub level: String,
}

impl Default for LogsConfig {
	fn default() -> Self {
		Self {
			dir: None,
			max_size_bytes: default_max_size(),
			max_age_days: default_max_age_days(),
			max_files: default_max_files(),
			level: default_level(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
	#[serde(default = "default_kill_grace_ms")]
	pub kill_grace_ms: u64,
}

impl Default for ProcessConfig {
	fn default() -> Self {
		Self {
			kill_grace_ms: default_kill_grace_ms(),
		}
	}
}

fn default_args() -> Vec<String> {
	vec!["--config".into(), "{config}".into()]
}
fn default_port() -> u16 {
	DEFAULT_PORT
}
fn default_max_size() -> u64 {
	10 * 1024 * 1024
}
fn default_max_age_days() -> u32 {
	7
}
fn default_max_files() -> u32 {
	10
}
fn default_level() -> String {
	"info".into()
}
fn default_kill_grace_ms() -> u64 {
	3000
}

/// `$XDG_CONFIG_HOME/hostvisor/config.toml`, else `~/.config/hostvisor/config.toml`.
pub fn default_config_path() -> PathBuf {
	let dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join("hostvisor")
	} else if let Ok(home) = std::env::var("HOME") {
		PathBuf::from(home).join(".config").join("hostvisor")
	} else {
		PathBuf::from("/tmp").join("hostvisor")
	};
	dir.join("config.toml")
}

impl Settings {
	/// Load settings from `path`. Relative paths inside the file are taken
	/// relative to the directory holding it, which is also the default
	/// application root.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let settings = Self::parse(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		let base = path.parent().unwrap_or(Path::new("."));
		let base = fs::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());
		Ok(settings.anchored_at(&base))
	}

	pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(content)
	}

	fn anchored_at(mut self, base: &Path) -> Self {
		self.server.executable = base.join(&self.server.executable);
		self.server.config_path = base.join(&self.server.config_path);
		self.server.config_template = self.server.config_template.map(|t| base.join(t));
		self.app.root = Some(self.app.root.map_or_else(|| base.to_path_buf(), |r| base.join(r)));
		self.logs.dir = self.logs.dir.map(|d| base.join(d));
		self
	}

	pub fn app_root(&self) -> PathBuf {
		self.app.root.clone().unwrap_or_else(|| PathBuf::from("."))
	}

	fn render(&self, template: &str, config_path: &Path) -> String {
		template
			.replace("{port}", &self.server.port.to_string())
			.replace("{config}", &config_path.display().to_string())
			.replace("{app_root}", &self.app_root().display().to_string())
	}
}

impl ConfigSource for Settings {
	fn executable_path(&self) -> PathBuf {
		self.server.executable.clone()
	}

	fn server_config_path(&self) -> PathBuf {
		self.server.config_path.clone()
	}

	fn port(&self) -> u16 {
		self.server.port
	}

	fn update_server_config(&self, path: &Path) -> io::Result<()> {
		let Some(template) = &self.server.config_template else {
			return Ok(());
		};
		let rendered = self.render(&fs::read_to_string(template)?, path);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let mut tmp = path.as_os_str().to_owned();
		tmp.push(".tmp");
		fs::write(&tmp, rendered)?;
		fs::rename(&tmp, path)
	}

	fn launch_args(&self, config_path: &Path) -> Vec<String> {
		let config = config_path.display().to_string();
		self.server.args.iter().map(|arg| arg.replace("{config}", &config)).collect()
	}

	fn extra_env(&self) -> BTreeMap<String, String> {
		self.server.env.clone()
	}
}
