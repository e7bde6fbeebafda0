use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    evaluation_service::run().await
}
