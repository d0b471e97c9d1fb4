//! Component G — download controller.
//!
//! Owns the state machine `IDLE → SIZE_PROBING → FETCHING → VERIFYING →
//! {DONE | FAILED | SUSPENDED | ABORTED}`, the suspend/abort protocol,
//! and progress/event emission. This is the one piece of the pipeline
//! that talks to every other component.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use dwl_core::config::{DwlConfig, RangeNotHonoured};
use dwl_core::credentials::FileCredentialStore;
use dwl_core::crypto::{parse_public_key, verify_signature};
use dwl_core::event::{Event, EventSink};
use dwl_core::wire::{Section, UpdateResult, UpdateType};
use dwl_core::workspace::{Workspace, WorkspaceStore};

use crate::dwl::{DwlError, DwlParser, ParseEvent};
use crate::http::{self, HttpError, HttpTimeouts};
use crate::sink::WriteSinkFactory;
use crate::uri::{self, UriError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    SizeProbing,
    Fetching,
    Verifying,
    Done,
    Failed,
    Suspended,
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Uri(#[from] UriError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Dwl(#[from] DwlError),
    #[error(transparent)]
    Workspace(#[from] dwl_core::workspace::WorkspaceError),
    #[error("package size unknown and no workspace to resume from")]
    NoPackageSize,
}

/// Shared suspend/abort flags: one pair per in-flight download, handed to
/// both the controller task and the HTTP control-surface handlers (§5).
#[derive(Clone, Default)]
pub struct ControlFlags {
    pub suspend: Arc<AtomicBool>,
    pub abort: Arc<AtomicBool>,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self { suspend: Arc::new(AtomicBool::new(false)), abort: Arc::new(AtomicBool::new(false)) }
    }

    fn reset(&self) {
        self.suspend.store(false, Ordering::SeqCst);
        self.abort.store(false, Ordering::SeqCst);
    }
}

pub struct DownloadController {
    config: DwlConfig,
    workspace_store: WorkspaceStore,
    credentials: Arc<FileCredentialStore>,
    sink_factory: Arc<dyn WriteSinkFactory>,
    event_sink: Arc<dyn EventSink>,
    flags: ControlFlags,
    user_agent: String,
}

impl DownloadController {
    pub fn new(
        config: DwlConfig,
        credentials: Arc<FileCredentialStore>,
        sink_factory: Arc<dyn WriteSinkFactory>,
        event_sink: Arc<dyn EventSink>,
        flags: ControlFlags,
    ) -> Self {
        let workspace_store = WorkspaceStore::new(config.workspace.path.clone());
        Self {
            config,
            workspace_store,
            credentials,
            sink_factory,
            event_sink,
            flags,
            user_agent: "dwl-client/1.0".to_string(),
        }
    }

    /// Initialisation: called when the host writes a new package URI
    /// (§4.G). Validates and persists, but does not fetch anything —
    /// `run` drives the actual state machine.
    #[instrument(skip(self))]
    pub fn initiate(&self, raw_uri: &str, update_type: UpdateType) -> Result<(), UpdateResult> {
        let parsed = match uri::parse(raw_uri) {
            Ok(p) => p,
            Err(err) => {
                warn!(error = %err, "rejecting package uri");
                return Err(UpdateResult::InvalidUri);
            }
        };
        let workspace = Workspace::new(raw_uri.to_string(), update_type);
        if self.workspace_store.save(&workspace).is_err() {
            return Err(UpdateResult::UpdateFailed);
        }
        self.flags.reset();
        debug!(host = %parsed.host, port = parsed.port, "workspace initialised");
        Ok(())
    }

    /// Runs the state machine to completion for whatever workspace is on
    /// disk. Returns the terminal event that was emitted.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Event {
        let Some(mut ws) = self.workspace_store.load() else {
            return Event::SessionFailed { reason: UpdateResult::InvalidUri };
        };

        self.event_sink.on_event(&Event::SessionStarted);
        info!(uri = %ws.uri, "download session started");

        let uri = match uri::parse(&ws.uri) {
            Ok(u) => u,
            Err(_) => {
                let event = Event::SessionFailed { reason: UpdateResult::InvalidUri };
                self.event_sink.on_event(&event);
                return event;
            }
        };

        if ws.package_size == 0 {
            match self.probe_size(&uri).await {
                Ok(size) => {
                    ws.package_size = size.unwrap_or(0);
                    let _ = self.workspace_store.save(&ws);
                    self.event_sink.on_event(&Event::PackageDetails { size });
                }
                Err(reason) => {
                    let event = Event::DownloadFailed { reason };
                    self.event_sink.on_event(&event);
                    return event;
                }
            }
        }

        match self.fetch_and_verify(&uri, &mut ws).await {
            Ok(FetchOutcome::Verified) => {
                let _ = self.workspace_store.clear();
                let event = Event::DownloadFinished;
                self.event_sink.on_event(&event);
                event
            }
            Ok(FetchOutcome::Suspended) => {
                info!("download suspended, workspace retained");
                Event::SessionFinished
            }
            Ok(FetchOutcome::Aborted) => {
                let _ = self.workspace_store.clear();
                info!("download aborted");
                // DEFAULT result folds the facade back to IDLE/DEFAULT,
                // matching an abort's "clear URI" contract.
                let event = Event::DownloadFailed { reason: UpdateResult::Default };
                self.event_sink.on_event(&event);
                event
            }
            Err(reason) => {
                let event = Event::DownloadFailed { reason };
                self.event_sink.on_event(&event);
                event
            }
        }
    }

    async fn probe_size(&self, uri: &crate::uri::PackageUri) -> Result<Option<u64>, UpdateResult> {
        let attempts = self.config.retry.head_attempts.max(1);
        let timeouts = HttpTimeouts::from_retry_config(&self.config.retry);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match http::head(uri, &self.user_agent, timeouts).await {
                Ok(response) => {
                    self.event_sink.on_event(&Event::HttpStatus { status: response.status });
                    return Ok(response.content_length);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "head probe failed");
                    if let HttpError::Error(status) = err {
                        self.event_sink.on_event(&Event::HttpStatus { status });
                    }
                    let retriable = err.is_retriable_for_head();
                    last_err = Some(err);
                    if !retriable {
                        break;
                    }
                }
            }
        }
        Err(last_err.map(|e| e.classify()).unwrap_or(UpdateResult::ConnectionLost))
    }

    async fn fetch_and_verify(
        &mut self,
        uri: &crate::uri::PackageUri,
        ws: &mut Workspace,
    ) -> Result<FetchOutcome, UpdateResult> {
        let mut parser = if ws.offset == 0 { DwlParser::new() } else { DwlParser::resume(ws) };
        let mut sink = self.sink_factory.open(binary_bytes_written(ws)).map_err(|_| UpdateResult::NotEnoughFlash)?;
        let timeouts = HttpTimeouts::from_retry_config(&self.config.retry);

        loop {
            if self.flags.abort.load(Ordering::SeqCst) {
                return Ok(FetchOutcome::Aborted);
            }
            if self.flags.suspend.load(Ordering::SeqCst) {
                self.persist(&parser, ws);
                return Ok(FetchOutcome::Suspended);
            }

            let (response, mut body) = match http::get_range(uri, ws.offset, &self.user_agent, timeouts).await {
                Ok(ok) => ok,
                Err(err) => {
                    if let HttpError::Error(status) = &err {
                        self.event_sink.on_event(&Event::HttpStatus { status: *status });
                    }
                    return Err(err.classify());
                }
            };
            self.event_sink.on_event(&Event::HttpStatus { status: response.status });

            if ws.offset > 0 && response.status != 206 {
                match self.config.retry.range_not_honoured {
                    RangeNotHonoured::Realign => {
                        debug!("origin did not honour range, realigning from offset 0");
                        ws.offset = 0;
                        parser = DwlParser::new();
                        sink = self.sink_factory.open(0).map_err(|_| UpdateResult::NotEnoughFlash)?;
                    }
                    RangeNotHonoured::Fail => {
                        return Err(UpdateResult::UpdateFailed);
                    }
                }
            }

            loop {
                if self.flags.abort.load(Ordering::SeqCst) {
                    return Ok(FetchOutcome::Aborted);
                }
                if self.flags.suspend.load(Ordering::SeqCst) {
                    self.persist(&parser, ws);
                    return Ok(FetchOutcome::Suspended);
                }

                let chunk = body.next_chunk().await.map_err(|e| e.classify())?;
                let Some(bytes) = chunk else { break };

                let events = parser.feed(&bytes, ws.update_type).map_err(classify_dwl_error)?;
                ws.offset += bytes.len() as u64;

                for event in events {
                    match event {
                        ParseEvent::Binary(data) => {
                            if sink.write_package_data(&data).is_err() {
                                return Err(UpdateResult::NotEnoughFlash);
                            }
                        }
                        ParseEvent::SignatureReady { digest, signature } => {
                            self.verify(ws.update_type, &digest, &signature)?;
                            self.persist(&parser, ws);
                            self.event_sink.on_event(&Event::DownloadProgress { percent: 100 });
                            return Ok(FetchOutcome::Verified);
                        }
                    }
                }

                self.persist(&parser, ws);
                if let Some(total) = non_zero(ws.package_size) {
                    let percent = ((ws.offset.min(total) * 100) / total) as u8;
                    self.event_sink.on_event(&Event::DownloadProgress { percent });
                }
            }

            if parser.section() == Section::Done {
                // The final chunk carried SignatureReady already handled above.
                break;
            }
        }

        Ok(FetchOutcome::Verified)
    }

    fn verify(&self, update_type: UpdateType, digest: &[u8; 20], signature: &[u8]) -> Result<(), UpdateResult> {
        let der = self
            .credentials
            .public_key_der(update_type)
            .ok_or(UpdateResult::IntegrityFailure)?;
        let key = parse_public_key(&der).map_err(|_| UpdateResult::IntegrityFailure)?;
        verify_signature(&key, digest, signature).map_err(|_| UpdateResult::IntegrityFailure)
    }

    fn persist(&self, parser: &DwlParser, ws: &mut Workspace) {
        ws.section = parser.section();
        ws.section_remaining = parser.section_remaining();
        ws.crc_state = parser.crc_state();
        ws.sha1_state = parser.sha1_state();
        let (comment_size, binary_size, padding_size, signature_size, declared_crc) = parser.prolog_fields();
        ws.comment_size = comment_size;
        ws.binary_size = binary_size;
        ws.padding_size = padding_size;
        ws.signature_size = signature_size;
        ws.declared_crc = declared_crc;
        let _ = self.workspace_store.save(ws);
    }
}

enum FetchOutcome {
    Verified,
    Suspended,
    Aborted,
}

fn classify_dwl_error(err: DwlError) -> UpdateResult {
    match err {
        DwlError::CrcMismatch { .. } => UpdateResult::IntegrityFailure,
        DwlError::BadMagic => UpdateResult::UnsupportedType,
        DwlError::SignatureTooLarge(_) | DwlError::TrailingBytes => UpdateResult::UpdateFailed,
    }
}

/// How many BINARY-section bytes a prior attempt already handed to the
/// sink, derived from the persisted section/size fields rather than
/// stored separately — recoverable because `section_remaining` during
/// `Section::Binary` is exactly `binary_size - already_written`.
fn binary_bytes_written(ws: &Workspace) -> u64 {
    match ws.section {
        Section::Prolog | Section::Header | Section::Comment => 0,
        Section::Binary => (ws.binary_size as u64).saturating_sub(ws.section_remaining),
        Section::Padding | Section::Signature | Section::Done => ws.binary_size as u64,
    }
}

fn non_zero(value: u64) -> Option<u64> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}
