use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use rust_decimal::Decimal;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "settle-cli")]
#[command(about = "Operator CLI for the wager settlement service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "WAGER_ADMIN_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status
    Status,
    /// List all matches
    Matches,
    /// Show one match with its bets and payouts
    Match { id: String },
    /// Register a match and derive its deposit addresses
    Register {
        id: String,
        name: String,
        /// Team names, at least two
        #[arg(required = true, num_args = 2..)]
        teams: Vec<String>,
    },
    /// Record an unverified bet
    Bet {
        match_id: String,
        #[arg(long)]
        handle: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        team: String,
    },
    /// Pay out winners (re-run to retry failed payouts)
    Distribute {
        match_id: String,
        #[arg(long)]
        winner: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Matches => client.get(format!("{}/admin/matches", base)),
        Commands::Match { id } => client.get(format!("{}/admin/matches/{}", base, id)),
        Commands::Register { id, name, teams } => client
            .post(format!("{}/admin/matches", base))
            .json(&json!({ "id": id, "name": name, "teams": teams })),
        Commands::Bet {
            match_id,
            handle,
            address,
            amount,
            team,
        } => client
            .post(format!("{}/admin/matches/{}/bets", base, match_id))
            .json(&json!({
                "bettor_handle": handle,
                "bettor_address": address,
                "amount": amount,
                "team_name": team,
            })),
        Commands::Distribute { match_id, winner } => client
            .post(format!("{}/admin/matches/{}/distribute", base, match_id))
            .json(&json!({ "winner": winner })),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => {
            println!("{}", serde_json::to_string_pretty(&json)?);
            if !status.is_success() || json["success"] == Value::Bool(false) {
                std::process::exit(1);
            }
        }
        Err(_) => {
            eprintln!("Error: Admin API returned status {}", status);
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
            std::process::exit(1);
        }
    }
    Ok(())
}
