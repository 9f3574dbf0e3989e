use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use senado_sync::{
    config::AppConfig, db, mapper::parse_leading_int, repository::PgActRepository,
    senado::SenadoClient, telemetry, SyncService,
};

const USAGE: &str = "Usage: senado-sync recent | year <YYYY> | type <TIPO> [YYYY]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match args.first().map(String::as_str) {
        Some("recent") => Command::Recent,
        Some("year") => Command::Year(parse_year(args.get(1))?),
        Some("type") => {
            let act_type = args.get(1).context(USAGE)?.clone();
            let year = args.get(2).map(|raw| parse_year(Some(raw))).transpose()?;
            Command::Type(act_type, year)
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    let sync = build_service().await?;
    match command {
        Command::Recent => {
            let report = sync.sync_recent_years().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Year(year) => {
            let summary = sync.sync_year(year).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Type(act_type, year) => {
            let summary = sync.sync_type(&act_type, year).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

enum Command {
    Recent,
    Year(i32),
    Type(String, Option<i32>),
}

fn parse_year(raw: Option<&String>) -> Result<i32> {
    let raw = raw.context(USAGE)?;
    parse_leading_int(raw).with_context(|| format!("invalid year: {raw}"))
}

async fn build_service() -> Result<SyncService> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "cli",
        database_url = %config.redacted_database_url(),
        senado_api_base_url = %config.senado_api_base_url,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 2)?;
    db::run_migrations(&pool).await?;

    let repository = Arc::new(PgActRepository::new(pool));
    let client = Arc::new(SenadoClient::from_config(&config)?);
    Ok(SyncService::new(client, repository)
        .with_timezone(config.cron_timezone)
        .with_year_pause(config.sync_year_pause))
}
