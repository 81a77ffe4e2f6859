// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kiln job queue server binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kiln_server::{create_app_state, create_router, version};
use kiln_server_config::LogFormat;
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Kiln server - persistent background job queue over HTTP.
#[derive(Parser, Debug)]
#[command(name = "kiln-server", about = "Kiln job queue server", version)]
struct Args {
	/// Config file to load instead of /etc/kiln/server.toml
	#[arg(long, env = "KILN_SERVER_CONFIG")]
	config: Option<PathBuf>,

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

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => kiln_server_config::load_config_with_file(path)?,
		None => kiln_server_config::load_config()?,
	};

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	match config.logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		"starting kiln-server"
	);

	let pool =
		kiln_server_db::create_pool(&config.database.url, config.database.max_connections).await?;
	kiln_server_db::run_migrations(&pool).await?;

	let state = create_app_state(pool, &config.jobs)?;
	let runner = state.runner.clone();

	if config.jobs.enabled {
		runner.start().await;
	} else {
		tracing::info!("job runner disabled, jobs will be queued but not executed here");
	}

	let app = create_router(state)
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);

	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
		}
	}

	tracing::info!("Shutting down job runner...");
	runner.shutdown().await;

	tracing::info!("Server shutdown complete");
	Ok(())
}
