use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use pingops_console::{
    ConsoleClient, ProgressRenderer, load_records,
    session::{Screen, watch},
};
use pingops_jobs::Operation;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pingops-console", about = "Bulk PingOne user operations with live progress")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[arg(long, help = "Admin bearer token (falls back to PINGOPS_ADMIN_TOKEN)")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Submit a CSV of users and follow the job until it ends")]
    Run {
        #[arg(long)]
        operation: Operation,

        #[arg(long)]
        file: PathBuf,

        #[arg(long, default_value_t = 12)]
        max_steps: usize,
    },
    #[command(about = "Print a job's current status")]
    Status { job_id: String },
    #[command(about = "Ask the relay to stop a job at the next record boundary")]
    Cancel { job_id: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("pingops=warn".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let token = cli
        .token
        .or_else(|| std::env::var("PINGOPS_ADMIN_TOKEN").ok())
        .filter(|value| !value.trim().is_empty());
    let client = ConsoleClient::new(&cli.server, token)?;

    match cli.command {
        Command::Run {
            operation,
            file,
            max_steps,
        } => {
            let records = load_records(&file)?;
            let job = client.submit(operation, &records).await?;
            info!(job_id = %job.id, total = job.total_items, "job submitted");

            let mut renderer = ProgressRenderer::attach(&job);
            let mut screen = Screen::new(std::io::stdout(), max_steps);
            match client.events(&job.id).await {
                Ok(events) => watch(&client, &mut renderer, events, &mut screen).await?,
                Err(err) => {
                    renderer.disconnected(format!("could not open progress stream: {err}"));
                    screen.draw(&renderer)?;
                }
            }
            Ok(ExitCode::from(renderer.exit_code() as u8))
        }
        Command::Status { job_id } => {
            let job = client.status(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Cancel { job_id } => {
            let ack = client.cancel(&job_id).await?;
            println!("{}: {}", ack.job_id, ack.outcome);
            Ok(ExitCode::SUCCESS)
        }
    }
}
