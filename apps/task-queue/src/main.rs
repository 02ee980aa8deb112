//! Task Queue Service - Entry Point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    task_queue_service::run().await
}
