use beamforge::config::Config;
use beamforge::loader::{LmSpec, TableSpec};
use beamforge::Decoder;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// PATH[:IN[:OUT]], repeatable; applied as decode steps in order.
    #[arg(global = true, short = 'p', long = "phrase-table")]
    phrase_tables: Vec<TableSpec>,

    /// PATH[:IN[:OUT]], repeatable.
    #[arg(global = true, short = 'g', long = "generation-table")]
    generation_tables: Vec<TableSpec>,

    /// PATH[:FACTOR], repeatable.
    #[arg(global = true, short = 'l', long = "lm")]
    lms: Vec<LmSpec>,

    /// JSON config; explicit flags override its values.
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    #[arg(global = true, long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Decode(cmd::decode::DecodeArgs),
    Inspect(cmd::inspect::InspectArgs),
}

fn main() {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    // Logs go to stderr so stdout carries translations only
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    // Flags like --stack-size live in the subcommand's matches, not the root
    let (cli_config, sub_matches) = match &cli.command {
        Commands::Decode(args) => (&args.config, matches.subcommand_matches("decode")),
        Commands::Inspect(args) => (&args.config, matches.subcommand_matches("inspect")),
    };

    let config = match (&cli.config, sub_matches) {
        (Some(path), Some(sub)) => {
            info!("Loading config: {}", path.display());
            let mut file_config = Config::load_from_file(path).unwrap_or_else(|e| {
                error!("{}", e);
                process::exit(1);
            });
            file_config.merge_from_cli(cli_config, sub);
            file_config
        }
        _ => cli_config.clone(),
    };

    let decoder = Decoder::from_files(
        &cli.phrase_tables,
        &cli.generation_tables,
        &cli.lms,
        config,
    )
    .unwrap_or_else(|e| {
        error!("Failed to initialize decoder: {}", e);
        process::exit(1);
    });

    let result = match cli.command {
        Commands::Decode(args) => cmd::decode::run(&args, &decoder),
        Commands::Inspect(args) => cmd::inspect::run(&args, &decoder),
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
