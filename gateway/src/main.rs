use bff_gateway::server::create_app;
use bff_shared::config::Config;
use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(name = "bff-gateway")]
#[command(about = "generation BFF: accepts requests, persists rows, enqueues jobs, reports status")]
struct Cli {
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bff_shared::logging::init("bff_gateway=info");

    let config = Config::from_env()?;
    let cli = Cli::parse();

    let app = create_app(config).await?;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cli.port)).await?;
    info!(port = cli.port, "gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}
