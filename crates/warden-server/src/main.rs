// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Warden credential lifecycle server binary.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_server::jobs::{
	JobHistoryCleanupJob, LeaseReaperJob, LockoutCleanupJob, RotationTickJob,
};
use warden_server::{create_app_state, master_key, Providers};
use warden_server_config::LogFormat;
use warden_server_jobs::{JobRepository, JobScheduler};
use warden_server_leases::LeaseReaper;

mod version;

/// Warden server - credential lockout, leasing and rotation engine.
#[derive(Parser, Debug)]
#[command(name = "warden-server", about = "Warden credential lifecycle server", version)]
struct Args {
	/// Path to a TOML config file, replacing /etc/warden/server.toml
	#[arg(long, env = "WARDEN_SERVER_CONFIG")]
	config: Option<std::path::PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match args.config {
		Some(path) => warden_server_config::load_config_with_file(path)?,
		None => warden_server_config::load_config()?,
	};

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	match config.logging.format {
		LogFormat::Json => tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer().json())
			.init(),
		LogFormat::Text => tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer())
			.init(),
	}

	tracing::info!(database = %config.database.url, "starting warden-server");

	let master_key = master_key(&config)?;

	let pool = warden_server_db::create_pool(&config.database.url).await?;
	warden_server_db::run_migrations(&pool).await?;

	// Provider implementations are registered by deployments that link them in.
	let state = create_app_state(pool.clone(), &config, master_key, Providers::default());

	let (shutdown_tx, _) = broadcast::channel(1);
	let (rotation_scheduler, rotation_worker) = state.rotation.scheduler();
	let worker_handle = tokio::spawn(rotation_worker.run(shutdown_tx.subscribe()));

	let job_repo = Arc::new(JobRepository::new(pool.clone()));
	let mut scheduler = JobScheduler::new(Arc::clone(&job_repo));

	scheduler.register_periodic(
		Arc::new(RotationTickJob::new(rotation_scheduler)),
		Duration::from_secs(config.rotation.tick_interval_secs),
	);
	scheduler.register_periodic(
		Arc::new(LeaseReaperJob::new(LeaseReaper::new(state.leases.clone()))),
		Duration::from_secs(config.leases.reaper_interval_secs),
	);
	if config.lockout.enabled {
		scheduler.register_periodic(
			Arc::new(LockoutCleanupJob::new(state.lockout_guard.clone())),
			Duration::from_secs(config.lockout.cleanup_interval_secs),
		);
	}
	scheduler.register_periodic(
		Arc::new(JobHistoryCleanupJob::new(
			Arc::clone(&job_repo),
			config.jobs.history_retention_days,
		)),
		Duration::from_secs(config.jobs.history_cleanup_interval_secs),
	);

	scheduler.start().await?;
	tracing::info!(jobs = ?scheduler.job_ids(), "background jobs started");

	tokio::signal::ctrl_c().await?;
	tracing::info!("Received shutdown signal");

	scheduler.shutdown().await;
	let _ = shutdown_tx.send(());
	if let Err(e) = worker_handle.await {
		tracing::warn!(error = %e, "rotation worker did not stop cleanly");
	}

	tracing::info!("Server shutdown complete");
	Ok(())
}
