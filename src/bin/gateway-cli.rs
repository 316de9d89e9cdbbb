use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the edge gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// Show circuit breaker state per backend
    Breakers,
    /// List registered services
    Services,
    /// Register or replace a service
    Register {
        /// Logical service name, e.g. `user`
        name: String,
        /// Base URL, e.g. `http://10.0.0.5:5000`
        service_url: String,
    },
    /// Remove a service registration
    Deregister { name: String },
    /// Reset a backend's circuit breaker to closed
    Reset { service: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/status", base)).send().await?,
        Commands::Breakers => client.get(format!("{}/breaker-status", base)).send().await?,
        Commands::Services => client.get(format!("{}/services", base)).send().await?,
        Commands::Register { name, service_url } => {
            client
                .post(format!("{}/register", base))
                .json(&json!({ "service_name": name, "service_url": service_url }))
                .send()
                .await?
        }
        Commands::Deregister { name } => {
            client
                .post(format!("{}/deregister", base))
                .json(&json!({ "serviceName": name }))
                .send()
                .await?
        }
        Commands::Reset { service } => {
            client
                .post(format!("{}/breakers/{}/reset", base, service))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
