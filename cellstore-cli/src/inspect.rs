//! Inspect subcommand
//!
//! Prints an array's schema and per-fragment tile counts.

use std::sync::Arc;

use cellstore::{ArrayCoordinator, Config, FragmentReader, PosixBackend};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Print schema and fragment summary for an array")]
pub struct Args {
    /// Path to the array directory
    #[arg(value_name = "PATH")]
    path: String,
}

pub fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let backend: Arc<dyn cellstore::Backend> = Arc::new(PosixBackend::new(args.path.as_str(), false)?);
    let config = Config::new(args.path.as_str());
    let coordinator = ArrayCoordinator::open_existing(backend, config, ".")?;
    let schema = coordinator.schema();

    println!("dimensions: {}", schema.dimension_names.join(", "));
    println!("dense: {}", schema.dense);
    println!("cell order: {:?}", schema.cell_order);
    println!("tile order: {:?}", schema.tile_order);
    println!("capacity: {}", schema.capacity);
    println!("attributes:");
    for attr in &schema.attributes {
        println!(
            "  {} type={:?} cell_val_num={:?} compressor={:?}",
            attr.name, attr.cell_type, attr.cell_val_num, attr.compressor
        );
    }

    let fragments = coordinator.fragment_paths();
    println!("fragments: {}", fragments.len());
    for fragment_path in &fragments {
        let reader = FragmentReader::open(Arc::clone(coordinator.backend()), Arc::clone(schema), fragment_path)?;
        println!("  {} tiles={}", fragment_path, reader.tile_count());
    }

    Ok(())
}
