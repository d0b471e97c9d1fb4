//! Event model and update-state facade.
//!
//! [`Event`] is what the controller (component G) hands to the single
//! host callback (component I, the event bus). [`UpdateStateFacade`]
//! (component H) is the thing an LwM2M Firmware/Software Update object
//! implementation actually reads — `state`/`result` plus progress — kept
//! consistent purely by folding events through [`UpdateStateFacade::apply`].

use crate::wire::{UpdateResult, UpdateState};
use serde::{Deserialize, Serialize};

/// Tagged event value emitted by the download controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    SessionStarted,
    SessionFailed { reason: UpdateResult },
    SessionFinished,
    /// Emitted once the size probe (HEAD) completes; always precedes any
    /// `DownloadProgress` for the same attempt.
    PackageDetails { size: Option<u64> },
    /// Monotonically non-decreasing within one download attempt.
    DownloadProgress { percent: u8 },
    /// Status code of a completed HEAD or GET response, success or
    /// failure alike — feeds `UpdateStateFacade::last_http_error`.
    HttpStatus { status: u16 },
    DownloadFinished,
    DownloadFailed { reason: UpdateResult },
    UpdateStarted,
    UpdateFinished,
    UpdateFailed { reason: UpdateResult },
}

/// A single registered host callback. Invoked synchronously from the
/// controller's execution context — implementations must not reenter the
/// controller. No registered sink is not an error: events are simply
/// dropped, per component I's contract.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// The default sink: drops every event. Used when the host has not
/// registered a callback.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_event(&self, _event: &Event) {}
}

/// What an LwM2M Firmware/Software Update object implementation reads.
/// Mutated exclusively by [`UpdateStateFacade::apply`] — nothing else is
/// allowed to touch `state`/`result` directly, which keeps the pair
/// always internally consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStateFacade {
    pub state: UpdateState,
    pub result: UpdateResult,
    pub package_uri: Option<String>,
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub progress_percent: Option<u8>,
    /// Process-local "last HTTP error" slot for telemetry; `None` if
    /// never populated. Not persisted.
    pub last_http_error: Option<u16>,
}

impl Default for UpdateStateFacade {
    fn default() -> Self {
        Self {
            state: UpdateState::Idle,
            result: UpdateResult::Default,
            package_uri: None,
            package_name: None,
            package_version: None,
            progress_percent: None,
            last_http_error: None,
        }
    }
}

impl UpdateStateFacade {
    /// A write to `package_uri` initiates a download. An empty write
    /// resets everything back to IDLE/DEFAULT.
    pub fn initiate(&mut self, uri: String) {
        if uri.is_empty() {
            *self = Self::default();
            return;
        }
        self.state = UpdateState::Downloading;
        self.result = UpdateResult::Default;
        self.package_uri = Some(uri);
        self.package_name = None;
        self.package_version = None;
        self.progress_percent = Some(0);
        self.last_http_error = None;
    }

    /// The only mutation path for `state`/`result` — see the module doc
    /// comment.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::SessionStarted => {
                self.state = UpdateState::Downloading;
            }
            Event::SessionFailed { reason } | Event::DownloadFailed { reason } => {
                self.state = UpdateState::Idle;
                self.result = *reason;
            }
            Event::SessionFinished => {}
            Event::PackageDetails { .. } => {
                self.state = UpdateState::Downloading;
            }
            Event::DownloadProgress { percent } => {
                self.state = UpdateState::Downloading;
                self.progress_percent = Some((*percent).min(100));
            }
            Event::HttpStatus { status } => {
                self.last_http_error = Some(*status);
            }
            Event::DownloadFinished => {
                self.state = UpdateState::Downloaded;
                self.result = UpdateResult::Success;
                self.progress_percent = Some(100);
            }
            Event::UpdateStarted => {
                self.state = UpdateState::Updating;
            }
            Event::UpdateFinished => {
                // The core never observes the outcome of the platform's
                // own apply/reboot step; it only confirms the package was
                // verified, which already happened at DownloadFinished.
            }
            Event::UpdateFailed { reason } => {
                self.state = UpdateState::Downloaded;
                self.result = *reason;
            }
        }
    }
}
