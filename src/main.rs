#[tokio::main]
async fn main() -> anyhow::Result<()> {
    equipsync_lib::run().await
}
