mod channels;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tokio::signal::unix::{signal, SignalKind};

use hostvisor::config::{self, Settings};
use hostvisor::{OsProcessControl, SweepReport, Supervisor, SystemEnvironment, Verdict};

#[derive(Debug, Parser)]
#[command(name = "hostvisor", version, about = "Run and supervise a local HTTP host")]
struct Cli {
	/// Config file [default: $XDG_CONFIG_HOME/hostvisor/config.toml]
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Start the server and supervise it until Ctrl-C (SIGHUP restarts it)
	Run,
	/// Kill leftover copies of the server executable
	Sweep,
	/// List running copies of the server executable
	Ps,
	/// Print the URL the server answers on
	Url,
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	let path = cli.config.unwrap_or_else(config::default_config_path);

	let settings = match Settings::load(&path) {
		Ok(s) => s,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};
	channels::init_tracing(&settings.logs.level);

	let logs = channels::build(&settings.logs);
	let control = OsProcessControl::new(Duration::from_millis(settings.process.kill_grace_ms));
	let env = SystemEnvironment::new(settings.app_root());
	let sup = Supervisor::new(Arc::new(settings), Arc::new(env), Arc::new(control), logs);

	match cli.command {
		Command::Run => cmd_run(sup).await,
		Command::Sweep => {
			let report = sup.sweep_orphans().await;
			print_report(&report);
			if report.is_clean() {
				ExitCode::SUCCESS
			} else {
				ExitCode::FAILURE
			}
		}
		Command::Ps => cmd_ps(&sup),
		Command::Url => {
			println!("{}", sup.app_url());
			ExitCode::SUCCESS
		}
	}
}

async fn cmd_run(sup: Arc<Supervisor>) -> ExitCode {
	let mut hangup = match signal(SignalKind::hangup()) {
		Ok(s) => s,
		Err(e) => {
			eprintln!("{} cannot listen for SIGHUP: {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};

	// copies left behind by an earlier run would hold the port
	let leftover = sup.sweep_orphans().await;
	if !leftover.killed.is_empty() {
		eprintln!("killed {} leftover server process(es)", leftover.killed.len());
	}

	if let Err(e) = sup.start().await {
		eprintln!("{} {}", "error:".red().bold(), e);
		return ExitCode::FAILURE;
	}
	eprintln!("{} {} (pid {})", "serving".green().bold(), sup.app_url(), sup.process_id());

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			_ = hangup.recv() => {
				if let Err(e) = sup.restart().await {
					eprintln!("{} {}", "error:".red().bold(), e);
					sup.stop().await;
					return ExitCode::FAILURE;
				}
				eprintln!("{} {} (pid {})", "restarted".green().bold(), sup.app_url(), sup.process_id());
			}
		}
	}

	tracing::info!("shutting down");
	sup.stop().await;
	ExitCode::SUCCESS
}

fn cmd_ps(sup: &Supervisor) -> ExitCode {
	let candidates = match sup.survey() {
		Ok(c) => c,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};

	if candidates.is_empty() {
		eprintln!("{}", "no running copies".dimmed());
		return ExitCode::SUCCESS;
	}

	for candidate in &candidates {
		let path = candidate
			.info
			.start_path
			.as_deref()
			.map(|p| p.display().to_string())
			.unwrap_or_else(|| "<unknown>".to_string());
		let verdict = match &candidate.verdict {
			Verdict::Orphan => "same executable".yellow().to_string(),
			Verdict::DifferentPath => "different path".dimmed().to_string(),
			Verdict::Unresolvable(reason) => format!("unresolved: {}", reason).red().to_string(),
		};
		println!("{:>7}  {}  {}", candidate.info.pid.bold(), verdict, path);
	}
	ExitCode::SUCCESS
}

fn print_report(report: &SweepReport) {
	if let Some(reason) = &report.aborted {
		eprintln!("{} {}", "sweep aborted:".red().bold(), reason);
		return;
	}
	for pid in &report.killed {
		println!("{} {}", "killed".green(), pid);
	}
	for pid in &report.skipped {
		println!("{} {}", "skipped".dimmed(), pid);
	}
	for (pid, reason) in &report.failed {
		println!("{} {}: {}", "failed".red(), pid, reason);
	}
	if report.killed.is_empty() && report.failed.is_empty() {
		eprintln!("{}", "no orphans found".dimmed());
	}
}
