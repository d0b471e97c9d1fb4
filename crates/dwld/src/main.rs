//! dwld — the DWL download daemon: hosts exactly one download controller
//! at a time and exposes its status/control surface over loopback HTTP.

use std::sync::Arc;

use anyhow::Result;

use dwl_api::ApiState;
use dwl_client::{ControlFlags, FacadeHost, FileSinkFactory, UnimplementedUpdateHook};
use dwl_core::config::DwlConfig;
use dwl_core::credentials::FileCredentialStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = DwlConfig::write_default_if_missing()?;
    let config = DwlConfig::load()?;
    tracing::info!(path = %config_path.display(), port = config.status.port, "dwld starting");

    if let Some(parent) = config.workspace.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let package_path = config
        .workspace
        .path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("package.bin");

    let credentials = Arc::new(FileCredentialStore::new(config.keys.clone()));
    let facade = Arc::new(FacadeHost::new(Box::new(UnimplementedUpdateHook)));
    let flags = ControlFlags::new();
    let sink_factory = Arc::new(FileSinkFactory { path: package_path });

    let state = ApiState {
        config: config.clone(),
        facade,
        flags,
        credentials,
        sink_factory,
    };

    dwl_api::serve(state, config.status.port).await
}
