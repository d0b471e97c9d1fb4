//! Aggregated library error type.
//!
//! Follows §4.K: typed errors at every library boundary, `#[from]`
//! conversions so `?` composes across components without manual mapping.
//! Only the daemon/CLI boundary converts these into `anyhow` reports.

use crate::dwl::DwlError;
use crate::http::HttpError;
use crate::sink::SinkError;
use crate::uri::UriError;
use dwl_core::crypto::IntegrityError;
use dwl_core::workspace::WorkspaceError;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Uri(#[from] UriError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Dwl(#[from] DwlError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
