use std::sync::Arc;

use quotelink_commerce::{OrderSynchronizer, ShopifyClient};
use quotelink_core::config::{AppConfig, ConfigError, LoadOptions};
use quotelink_crm::{Gateway, HttpTransport, Reconciler};
use thiserror::Error;
use tracing::info;

use crate::orchestrator::{
    CommerceOrderSync, CrmLineItemSync, CrmQuoteApi, QuoteSyncOrchestrator,
};

pub struct Application {
    pub config: AppConfig,
    pub gateway: Gateway,
    pub orchestrator: Arc<QuoteSyncOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let client = reqwest::Client::builder()
        .user_agent(concat!("quotelink/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let transport = HttpTransport::new(
        client.clone(),
        config.crm.base_url.clone(),
        config.crm.access_token.clone(),
    );
    let gateway = Gateway::new(Arc::new(transport), &config.gateway);

    let commerce = ShopifyClient::new(
        client,
        config.commerce.base_url.clone(),
        config.commerce.access_token.clone(),
    );
    let synchronizer = OrderSynchronizer::new(Arc::new(commerce));

    let orchestrator = Arc::new(QuoteSyncOrchestrator::new(
        Arc::new(CrmQuoteApi::new(gateway.clone())),
        Arc::new(CrmLineItemSync::new(
            Reconciler::new(gateway.clone()),
            gateway.clone(),
            config.gateway.batch_page_size,
        )),
        Arc::new(CommerceOrderSync::new(synchronizer)),
    ));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        crm_base_url = %config.crm.base_url,
        commerce_base_url = %config.commerce.base_url,
        gateway_max_concurrency = config.gateway.max_concurrency,
        "application wiring complete"
    );

    Ok(Application { config, gateway, orchestrator })
}

#[cfg(test)]
mod tests {
    use quotelink_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap, BootstrapError};

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_tokens() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                commerce_base_url: Some("https://demo-store.example.com".to_string()),
                commerce_access_token: Some("shpat-demo".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = match result {
            Err(BootstrapError::Config(config_error)) => config_error.to_string(),
            other => panic!("expected config error, got {:?}", other.is_ok()),
        };
        assert!(message.contains("crm.access_token"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_wires_the_gateway_from_config() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                crm_access_token: Some("pat-na1-demo".to_string()),
                commerce_base_url: Some("https://demo-store.example.com".to_string()),
                commerce_access_token: Some("shpat-demo".to_string()),
                gateway_max_concurrency: Some(3),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed");

        assert_eq!(app.gateway.available_permits(), 3);
        assert_eq!(app.config.gateway.batch_page_size, 100);
    }
}
