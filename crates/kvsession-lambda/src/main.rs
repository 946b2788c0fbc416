use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::{error, info};

use kvsession_core::config::{self, StoreBackend};
use kvsession_core::session::SessionStore;

/// Runs one expiry sweep per invocation (e.g. from a scheduled function URL call).
#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kvsession=info".parse()?),
        )
        .with_ansi(false)
        .init();

    info!("kvsession GC Lambda starting...");

    let mut cfg = config::load_config_from_env();
    cfg.backend = StoreBackend::Dynamodb;
    let config_json = std::env::var("KVSESSION_CONFIG").ok();
    if std::env::var("KVSESSION_HOST").is_err() && !config_sets_host(config_json.as_deref()) {
        // Empty host selects the regional DynamoDB endpoint.
        info!("No store host configured, using the regional DynamoDB endpoint");
        cfg.host = String::new();
    }

    let store = SessionStore::from_config(&cfg).await?;
    let max_lifetime = cfg.max_lifetime;
    info!(bucket = %store.bucket().name(), max_lifetime, "Session store ready");

    run(service_fn(|_request: Request| {
        let store = store.clone();
        async move { sweep(&store, max_lifetime).await }
    }))
    .await
}

/// True if the `KVSESSION_CONFIG` JSON names a `host`.
fn config_sets_host(config_json: Option<&str>) -> bool {
    config_json
        .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok())
        .is_some_and(|value| value.get("host").is_some())
}

async fn sweep(store: &SessionStore, max_lifetime: u64) -> Result<Response<Body>, Error> {
    let bucket = store.bucket().name().to_string();
    let (status, body) = match store.adapter().collect_garbage(max_lifetime).await {
        Ok(removed) => (
            200,
            serde_json::json!({ "bucket": bucket, "removed": removed }),
        ),
        Err(e) => {
            error!(bucket = %bucket, "GC sweep failed: {}", e);
            (
                500,
                serde_json::json!({ "bucket": bucket, "error": e.to_string() }),
            )
        }
    };

    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?)
}
