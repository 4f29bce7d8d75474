use std::sync::Arc;

use chrono::TimeDelta;
use clap::Parser;
use pingops_admin::{AdminSys, router::admin_router};
use pingops_common::time;
use pingops_jobs::JobController;
use pingops_pingone::{PingOneClient, PingOneConfig, PingOneExecutor};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_RETENTION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Parser)]
#[command(name = "pingops-server", about = "Relay for bulk PingOne user operations")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value = "8080")]
    port: u16,

    #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(i64).range(0..=MAX_RETENTION_SECS))]
    job_retention_secs: i64,

    #[arg(long, default_value_t = 60)]
    prune_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("pingops=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);

    let config = PingOneConfig::from_env()?;
    info!(
        environment_id = %config.environment_id,
        api_url = %config.api_url,
        "PingOne target configured"
    );
    let retention = TimeDelta::try_seconds(cli.job_retention_secs).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "--job-retention-secs is out of range",
        )
    })?;
    let client = Arc::new(PingOneClient::new(config)?);
    let jobs =
        JobController::new(Arc::new(PingOneExecutor::new(client))).with_retention(retention);

    let admin_token = std::env::var("PINGOPS_ADMIN_TOKEN").ok();
    let admin = AdminSys::new(jobs.clone()).with_admin_token(admin_token);
    if admin.admin_token().is_none() {
        warn!("PINGOPS_ADMIN_TOKEN is not set; the job API is unauthenticated");
    }

    let prune_every = std::time::Duration::from_secs(cli.prune_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(prune_every);
        loop {
            interval.tick().await;
            match jobs.prune_finished(time::now()) {
                Ok(0) => {}
                Ok(pruned) => debug!(pruned, "pruned finished jobs"),
                Err(err) => warn!(error = %err, "job pruning failed"),
            }
        }
    });

    let app = admin_router(Arc::new(admin));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("pingops relay listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
