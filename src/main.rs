#[tokio::main]
async fn main() -> anyhow::Result<()> {
    therapy_avatar_engine_lib::run().await
}
