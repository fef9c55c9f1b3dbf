#[tokio::main]
async fn main() -> anyhow::Result<()> {
    machine_uptime_lib::run().await
}
