#[tokio::main]
async fn main() {
    let code = scriptgrab_engine::run().await;
    // Exit without waiting for a cancelled inference to wind down.
    std::process::exit(code);
}
