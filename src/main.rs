use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use simpledb::db::{SimpleDb, DEFAULT_BLOCK_SIZE, DEFAULT_BUFFER_COUNT};
use simpledb::file::block_id::BlockId;

/// A teaching-style single-node database engine's transactional storage core.
#[derive(Parser)]
struct Cli {
    /// Block size in bytes for pages and log blocks.
    #[arg(short = 'b', long = "block-size", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Database directory. Created if it does not already exist.
    #[arg(short = 'd', long = "dir", default_value = "./simpledb-data")]
    dir: PathBuf,

    /// Number of buffer pool frames.
    #[arg(short = 'n', long = "buffers", default_value_t = DEFAULT_BUFFER_COUNT)]
    buffers: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let dir = cli.dir.to_string_lossy().into_owned();
    let db = SimpleDb::new(&dir, cli.block_size, cli.buffers)?;

    let block = BlockId::new("greeting.tbl", 0);

    let mut tx1 = db.new_tx()?;
    tx1.pin(&block)?;
    tx1.set_string(&block, 0, "Hello, World!", false)?;
    tx1.commit()?;
    info!(?block, "transaction 1 committed a greeting");

    let mut tx2 = db.new_tx()?;
    tx2.pin(&block)?;
    let greeting = tx2.get_string(&block, 0)?;
    tx2.commit()?;
    info!(%greeting, "transaction 2 read back the greeting");

    info!(
        blocks_read = db.blocks_read(),
        blocks_written = db.blocks_written(),
        available_buffers = db.available_buffers(),
        "shutting down"
    );

    Ok(())
}
