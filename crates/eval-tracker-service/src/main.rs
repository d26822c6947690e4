use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use eval_tracker_api::{RequestService, SessionManager};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod oauth;
mod routes;
mod state;

use config::Args;
use state::{ServiceState, ServiceTelemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("eval_tracker={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    args.validate()?;

    let sessions_dir = args.sessions_dir();
    let requests = RequestService::open(&args.data_dir, args.backup_enabled)?;
    let sessions = SessionManager::open(
        &sessions_dir,
        time::Duration::hours(args.session_lifetime_hours),
    )?;
    let state = ServiceState {
        requests,
        sessions: sessions.clone(),
        identity: args.identity_provider()?,
        admin_users: Arc::new(args.admin_emails()),
        secure_cookies: args.secure_cookies,
        telemetry: Arc::new(ServiceTelemetry::default()),
        started_at: Instant::now(),
    };

    spawn_session_sweeper(sessions, Duration::from_secs(args.session_sweep_interval_secs));

    info!(
        bind = %args.bind,
        data_dir = %args.data_dir.display(),
        sessions_dir = %sessions_dir.display(),
        "starting evaluation tracker service"
    );
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, routes::app(state)).await?;
    Ok(())
}

fn spawn_session_sweeper(sessions: SessionManager, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let manager = sessions.clone();
            match tokio::task::spawn_blocking(move || manager.sweep_expired()).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!(error = %format!("{err:#}"), "session sweep failed"),
                Err(err) => warn!(error = %err, "session sweep task panicked"),
            }
        }
    });
}
