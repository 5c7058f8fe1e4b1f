//! Lambent - a custom AWS Lambda runtime
//!
//! The bootstrap binary the Lambda host starts inside the execution
//! environment. Resolves configuration and the configured handler at cold
//! start, then serves invocations until the host retires the environment.

mod handlers;

use std::sync::Arc;

use lambent_core::{config, ErrorEnvelope, RuntimeConfig};
use lambent_runtime::{FunctionMeta, Handler, Runtime, RuntimeApiClient};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Nothing can be reported before the endpoint is known, so a missing
    // endpoint ends the process on the spot.
    let endpoint = config::resolve(config::RUNTIME_API_VAR)?;
    let client = RuntimeApiClient::new(&endpoint)?;

    let (handler, function) = match cold_start() {
        Ok(parts) => parts,
        Err(envelope) => {
            error!(
                error_type = %envelope.error_type(),
                message = %envelope.message,
                "Initialization failed"
            );
            if let Err(err) = client.send_init_error(&envelope).await {
                error!(error = %err, "Failed to report init error");
            }
            anyhow::bail!("initialization failed: {}", envelope.message);
        }
    };

    let runtime = Runtime::new(client, handler, function);
    if let Err(err) = runtime.run().await {
        error!(error = %err, "Runtime loop failed");
        return Err(err.into());
    }
    Ok(())
}

/// Resolve configuration and the configured handler capability.
///
/// Every failure here is fatal and gets reported through the init error
/// call before the process exits.
fn cold_start() -> Result<(Arc<dyn Handler>, FunctionMeta), ErrorEnvelope> {
    let config = RuntimeConfig::from_env().map_err(ErrorEnvelope::from)?;

    let registry = handlers::registry();
    info!(
        handler = %config.handler_id,
        modules = registry.len(),
        "Resolving handler"
    );
    let handler = registry
        .resolve(&config.handler_id, &config.task_root)
        .map_err(|err| err.to_envelope())?;

    Ok((handler, FunctionMeta::from(&config)))
}

fn init_tracing() {
    let log_level = config::resolve_or("LAMBENT_LOG_LEVEL", "info");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("lambent={0},lambent_runtime={0},lambent_core={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
