//! HTTP control-surface handlers — exposes the download controller's
//! state as JSON and accepts download/suspend/abort/resume commands.

pub mod status;

use std::sync::Arc;

use dwl_client::{ControlFlags, FacadeHost, WriteSinkFactory};
use dwl_core::config::DwlConfig;
use dwl_core::credentials::FileCredentialStore;

#[derive(Clone)]
pub struct ApiState {
    pub config: DwlConfig,
    pub facade: Arc<FacadeHost>,
    pub flags: ControlFlags,
    pub credentials: Arc<FileCredentialStore>,
    pub sink_factory: Arc<dyn WriteSinkFactory>,
}

pub use status::{handle_abort, handle_download, handle_resume, handle_status, handle_suspend};
