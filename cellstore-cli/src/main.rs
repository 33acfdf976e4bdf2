mod consolidate;
mod inspect;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cellstore")]
#[command(about = "cellstore CLI tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print schema and fragment summary for an array
    Inspect(inspect::Args),
    /// Consolidate an array's fragments
    Consolidate(consolidate::Args),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger from RUST_LOG environment variable
    // Example: RUST_LOG=debug cellstore inspect ...
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect(args) => inspect::run(args),
        Commands::Consolidate(args) => consolidate::run(args),
    }
}
