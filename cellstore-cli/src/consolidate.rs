//! Consolidate subcommand
//!
//! Merges an array's fragments down in batches, per the consolidation
//! algorithm in `ArrayCoordinator::consolidate`.

use std::sync::Arc;

use cellstore::{ArrayCoordinator, Config, PosixBackend};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Consolidate an array's fragments")]
pub struct Args {
    /// Path to the array directory
    #[arg(value_name = "PATH")]
    path: String,

    /// Number of fragments to merge per consolidation batch
    #[arg(long, default_value_t = 10)]
    batch_size: usize,
}

pub fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let backend: Arc<dyn cellstore::Backend> = Arc::new(PosixBackend::new(args.path.as_str(), false)?);
    let config = Config::new(args.path.as_str());
    let coordinator = ArrayCoordinator::open_existing(backend, config, ".")?;

    let before = coordinator.fragment_paths().len();
    coordinator.consolidate(args.batch_size)?;
    let after = coordinator.fragment_paths().len();

    println!("consolidated {before} fragments into {after}");
    Ok(())
}
