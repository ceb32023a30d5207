// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Loom scheduler server binary.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use loom_scheduler_core::{Schedule, UrlGuard};
use loom_server_config::{LogFormat, LoggingConfig, ServerConfig};
use loom_server_scheduler::{
	create_pool, register_core_jobs, replay_overrides, run_migrations, schedule_active_tasks,
	JobRegistry, SqliteOverrideRepository, SqliteTaskRepository, TaskExecutor, TaskRepository,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Loom scheduler - runs built-in jobs and scheduled HTTP tasks.
#[derive(Parser, Debug)]
#[command(name = "loom-scheduler", about = "Loom dynamic job scheduler", version)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/loom/scheduler.toml)
	#[arg(long, env = "LOOM_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the scheduler until interrupted (default)
	Serve,
	/// Validate a schedule expression and print its next fire times
	CheckSchedule {
		expression: String,
		/// Number of upcoming fire times to print (1-100)
		#[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..=100))]
		count: u16,
	},
	/// Check whether a URL is safe to use as a task target
	CheckUrl { url: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	match args.command.unwrap_or(Command::Serve) {
		Command::CheckSchedule { expression, count } => check_schedule(&expression, count),
		Command::CheckUrl { url } => check_url(&url).await,
		Command::Serve => {
			// Load .env file if present
			dotenvy::dotenv().ok();

			let config = match args.config {
				Some(path) => loom_server_config::load_config_with_file(path)?,
				None => loom_server_config::load_config()?,
			};
			init_tracing(&config.logging);
			serve(config).await
		}
	}
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);

	match logging.format {
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json())
			.init(),
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
	let guard = UrlGuard::system().allow_private_targets(config.scheduler.allow_private_targets);
	tracing::info!(
		database = %config.database.url,
		allow_private_targets = guard.allows_private_targets(),
		"starting loom-scheduler"
	);

	let pool = create_pool(&config.database.url, config.database.max_connections).await?;
	run_migrations(&pool).await?;

	let overrides = Arc::new(SqliteOverrideRepository::new(pool.clone()));
	let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
	let registry = Arc::new(JobRegistry::new(overrides.clone()));
	let executor = TaskExecutor::new(
		Arc::clone(&registry),
		Arc::clone(&tasks),
		guard,
		config.scheduler.user_agent.clone(),
	);

	register_core_jobs(&registry, Arc::clone(&tasks), &config.scheduler).await?;
	replay_overrides(&registry, overrides.as_ref()).await?;
	schedule_active_tasks(&executor, tasks.as_ref()).await?;

	for job in registry.list().await {
		tracing::info!(
			source = %job.source,
			name = %job.name,
			schedule = %job.schedule,
			overridden = job.is_overridden,
			next_run = ?job.next_run,
			"job scheduled"
		);
	}

	tokio::signal::ctrl_c().await?;
	tracing::info!("shutdown signal received");

	registry.shutdown().await;
	pool.close().await;
	tracing::info!("loom-scheduler stopped");
	Ok(())
}

fn check_schedule(expression: &str, count: u16) -> Result<(), Box<dyn std::error::Error>> {
	let schedule = Schedule::parse(expression)?;
	println!("valid schedule: {schedule}");
	for next in schedule.upcoming(Utc::now(), usize::from(count)) {
		println!("  {}", next.to_rfc3339());
	}
	Ok(())
}

async fn check_url(url: &str) -> Result<(), Box<dyn std::error::Error>> {
	let vetted = UrlGuard::system().vet(url).await?;
	println!("safe URL: {}", vetted.url);
	for addr in &vetted.addrs {
		println!("  {addr}");
	}
	Ok(())
}
