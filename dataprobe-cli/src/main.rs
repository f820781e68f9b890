use anyhow::Result;
use clap::Parser;
use dataprobe_cli::cli::{self, Cli, Commands};
use dataprobe_cli::mock_server;
use dataprobe_core::logger::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Probe(args) => {
            let config = args.config()?;
            init_logging(cli.json_logs || config.log_json);
            cli::probe_command(args, config).await
        }
        Commands::MockServer(args) => {
            init_logging(cli.json_logs);
            mock_server::start_mock_server(args.port, args.options()).await
        }
    }
}
