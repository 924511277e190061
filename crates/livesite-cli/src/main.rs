//! livesite - wakes up, rewrites a piece of its own website, goes back to
//! sleep.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    livesite_cli::run().await
}
