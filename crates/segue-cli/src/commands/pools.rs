//! Raw pool listing.

use clap::Args;
use segue_config::EngineConfig;
use segue_store::{PoolFile, StoreOptions};

/// List pools inside a pool file.
#[derive(Args)]
pub struct PoolsArgs {
    /// Path to the pool file
    pub file: std::path::PathBuf,
}

/// Run the pools command.
pub fn run(args: PoolsArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let file = PoolFile::open(
        &args.file,
        StoreOptions {
            block_size: config.block_size,
            cache_blocks: config.cache_blocks,
        },
    )?;

    println!("{:<28} {:>8} {:>14}", "pool", "elem", "length");
    for name in file.pool_names() {
        println!(
            "{:<28} {:>8} {:>14}",
            name,
            file.pool_element_size(&name)?,
            file.pool_len(&name)?
        );
    }

    let stats = file.stats();
    println!();
    println!(
        "{} blocks of {} bytes, {} free, {} metadata",
        stats.total_blocks, stats.block_size, stats.free_blocks, stats.metadata_blocks
    );
    Ok(())
}
