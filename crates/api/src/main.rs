use std::sync::Arc;

use anyhow::Context;

use schoolerp_infra::config::AppConfig;
use schoolerp_infra::external::{InMemoryMailTransport, MailTransport, SmtpMailTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    schoolerp_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let transport: Arc<dyn MailTransport> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailTransport::new(smtp).context("failed to set up SMTP")?),
        None => Arc::new(InMemoryMailTransport::new()),
    };

    let services = schoolerp_api::app::services::build_services(&config, transport);
    let app = schoolerp_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
