#[tokio::main]
async fn main() -> anyhow::Result<()> {
    campaign_api::api::server::run_server().await
}
