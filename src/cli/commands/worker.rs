//! Hidden `watermarker worker` entry point for process-pool children

use crate::parallel::serve;
use anyhow::Result;
use std::io;

pub async fn execute() -> Result<()> {
    let served = tokio::task::spawn_blocking(|| serve(io::stdin().lock(), io::stdout().lock()))
        .await??;
    tracing::debug!("Worker exiting after {} tasks", served);
    Ok(())
}
