#[tokio::main]
async fn main() {
    if let Err(e) = planboard_backend::run().await {
        log::error!(target: "planboard.startup", "{}", e);
        eprintln!("planboard: {}", e);
        std::process::exit(1);
    }
}
