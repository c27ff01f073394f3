use mock_server::{MockOptions, RequestLog};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mock_server=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let options = MockOptions {
        api_key: std::env::var("MOCK_API_KEY").ok().filter(|k| !k.is_empty()),
        chat_token: std::env::var("MOCK_CHAT_TOKEN").ok().filter(|t| !t.is_empty()),
        ..MockOptions::default()
    };
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, api_key = options.api_key.is_some(), "mock code generation service listening");
    mock_server::run_with(listener, options, RequestLog::default()).await
}
