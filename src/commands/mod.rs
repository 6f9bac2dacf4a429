mod poll;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "group-rank",
    about = "Ranked-choice polls ordered by average rank",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Create a poll from the command line
    Create {
        /// The poll title
        title: String,
        /// At least two option names
        #[arg(required = true, num_args = 2..)]
        options: Vec<String>,
    },
    /// Print a poll and its options
    Show { poll_id: Uuid },
    /// Close a poll so results become available
    Close { poll_id: Uuid },
    /// Print the final standings of a closed poll
    Results { poll_id: Uuid },
    /// Delete a poll together with its options and rankings
    Purge { poll_id: Uuid },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => {
            if let Some(host) = args.host {
                config.server.host = host;
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            server::run(config).await
        }
        Command::Create { title, options } => poll::create(&config, &title, &options).await,
        Command::Show { poll_id } => poll::show(&config, poll_id).await,
        Command::Close { poll_id } => poll::close(&config, poll_id).await,
        Command::Results { poll_id } => poll::results(&config, poll_id).await,
        Command::Purge { poll_id } => poll::purge(&config, poll_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["group-rank"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn create_needs_two_options() {
        assert!(Cli::try_parse_from(["group-rank", "create", "Lunch", "Pizza"]).is_err());
        let cli = Cli::try_parse_from(["group-rank", "create", "Lunch", "Pizza", "Sushi"])
            .expect("parses");
        match cli.command {
            Some(Command::Create { title, options }) => {
                assert_eq!(title, "Lunch");
                assert_eq!(options, vec!["Pizza", "Sushi"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn poll_ids_must_be_uuids() {
        assert!(Cli::try_parse_from(["group-rank", "close", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["group-rank", "results", id.as_str()]).is_ok());
    }

    #[test]
    fn serve_accepts_overrides() {
        let cli = Cli::try_parse_from(["group-rank", "serve", "--port", "8080"]).expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8080));
                assert!(args.host.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
