use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(about = "Management CLI for the fleet orchestrator", long_about = None)]
struct Cli {
    /// Admin API of the leader.
    #[arg(short, long, env = "FLEET_ADMIN_URL", default_value = "http://localhost:3000")]
    url: String,

    #[arg(short, long, env = "FLEET_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check leader status
    Status,
    /// List running services and their instances
    Services,
    /// List healthy load balancers of a service
    LoadBalancers {
        /// Service id
        id: u64,
    },
    /// Re-read service definitions now
    Reload,
    /// Ask a ring node whether it is the leader
    Leader {
        #[arg(short, long)]
        port: u16,

        #[arg(long, default_value = "localhost")]
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Services => {
            client
                .get(format!("{}/admin/services", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::LoadBalancers { id } => {
            client
                .get(format!("{}/api/service/{}/load-balancers", cli.url, id))
                .send()
                .await?
        }
        Commands::Reload => {
            client
                .post(format!("{}/admin/reload", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Leader { port, host } => {
            client
                .get(format!("http://{}:{}/health", host, port))
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
