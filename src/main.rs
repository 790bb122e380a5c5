use tontine_backend::api;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().flatten_event(true))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    dotenv::dotenv().ok();

    if let Err(e) = api::start_http_server().await {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
