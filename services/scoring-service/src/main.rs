use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    scoring_service::run().await
}
