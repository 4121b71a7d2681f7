use intranet_chat::rocket;

#[rocket::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = rocket().launch().await {
        tracing::error!(error = ?e, "server failed to launch");
        std::process::exit(1);
    }
}
