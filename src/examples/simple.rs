//! Simple example: run one acquisition and validation pass against an
//! in-memory store, then print the best proxies.

use proxy_pool::{
    default_collectors, run_collectors, HttpProbe, MemoryStore, ScoredStore, Validator,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let store = Arc::new(MemoryStore::new());

    println!("Acquiring candidates...");
    let summary = run_collectors(&default_collectors(), store.as_ref()).await;
    println!(
        "Acquired {} candidates from {} sources ({} failed)",
        summary.inserted, summary.succeeded, summary.failed
    );

    let probe = Arc::new(HttpProbe::new(
        "http://httpbin.org/ip",
        "https://httpbin.org/ip",
        Duration::from_secs(5),
    ));
    let validator = Validator::new(probe, 50);

    println!("Validating...");
    let batch: Vec<_> = store
        .top(store.count().await?)
        .await?
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    let report = validator.validate(&batch).await;

    store.update_scores(&report.survivors).await?;
    store.remove_many(&report.dead).await?;

    println!("Top proxies:");
    for (id, score) in store.top(10).await? {
        println!("  {score:5.1}  {id}");
    }

    Ok(())
}
