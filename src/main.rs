use clap::Parser;
use group_rank::commands::{self, Cli};
use log::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = commands::run(cli).await {
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}
