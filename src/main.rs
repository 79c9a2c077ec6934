#[tokio::main]
async fn main() {
    if let Err(e) = clinic_reviews::run().await {
        tracing::error!(error = %e, "Fatal startup error");
        eprintln!("clinic-reviews: {e}");
        std::process::exit(1);
    }
}
