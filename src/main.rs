use eyre::Result;
use service_probe::configuration::get_configuration;
use service_probe::{get_subscriber, init_subscriber, startup::{build, router}};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` may carry RUST_LOG, so load it before the subscriber reads it.
    dotenvy::dotenv().ok();
    init_subscriber(get_subscriber(
        "service-probe".into(),
        "info".into(),
        std::io::stdout,
    ));

    let configuration = get_configuration()?;
    let address = configuration.application.address();
    let listener = TcpListener::bind(&address).await?;
    let app = router(build(&configuration));
    tracing::info!(%address, "Starting {}", configuration.application.service_name);
    Ok(axum::serve(listener, app).await?)
}
