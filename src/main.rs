#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = omr_grader::run().await {
        eprintln!("omr-grader fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
