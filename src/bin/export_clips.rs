//! export_clips - list stored evidence clips or write one out as a video file

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use cidroy::SqliteEvidenceStore;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the clip database.
    #[arg(long, env = "CIDROY_DB_PATH", default_value = "cidroy.db")]
    db: String,
    /// Maximum clips to list, newest first.
    #[arg(long, default_value_t = 20)]
    limit: usize,
    /// Clip id to export instead of listing.
    #[arg(long, requires = "out")]
    id: Option<i64>,
    /// Output file for the exported clip.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let store = SqliteEvidenceStore::open(&args.db)?;

    match (args.id, args.out) {
        (Some(id), Some(out)) => {
            let clip = store
                .get(id)?
                .ok_or_else(|| anyhow!("clip {} not found in {}", id, args.db))?;
            let payload = clip.record.decode_payload()?;
            std::fs::write(&out, &payload)
                .map_err(|e| anyhow!("failed to write {}: {}", out.display(), e))?;
            println!(
                "clip {} ({} bytes, {}) written to {}",
                id,
                payload.len(),
                clip.record.mime_type,
                out.display()
            );
        }
        _ => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for clip in store.list(args.limit)? {
                serde_json::to_writer(&mut out, &clip.summary())?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}
