use crate::fees::{run_fee_balance, run_fee_quote, FeeBalanceArgs, FeeQuoteArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use rebate_tracker::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Rebate Tracker",
    about = "Run the HVAC rebate tracking service and fee tools from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Quote project fees and contractor balances
    Fees {
        #[command(subcommand)]
        command: FeesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum FeesCommand {
    /// Referral and filing fees for a project cost
    Quote(FeeQuoteArgs),
    /// Outstanding balance for a contractor
    Balance(FeeBalanceArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Fees {
            command: FeesCommand::Quote(args),
        } => run_fee_quote(args),
        Command::Fees {
            command: FeesCommand::Balance(args),
        } => run_fee_balance(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["rebate-tracker"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn fee_quote_parses_currency() {
        let cli = Cli::try_parse_from(["rebate-tracker", "fees", "quote", "--cost", "$6,000"])
            .expect("parses");
        match cli.command {
            Some(Command::Fees {
                command: FeesCommand::Quote(args),
            }) => assert_eq!(args.cost, 6_000.0),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn balance_requires_owed_amounts() {
        assert!(Cli::try_parse_from(["rebate-tracker", "fees", "balance"]).is_err());
    }
}
