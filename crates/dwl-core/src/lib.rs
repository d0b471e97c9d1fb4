//! dwl-core — shared wire format, integrity primitives, configuration, and
//! the resumable workspace/event model. Every other crate in this
//! workspace depends on this one.

pub mod config;
pub mod credentials;
pub mod crypto;
pub mod event;
pub mod wire;
pub mod workspace;

pub use config::DwlConfig;
pub use credentials::{CredentialSlot, CredentialStore, FileCredentialStore};
pub use event::{Event, EventSink, NoopEventSink, UpdateStateFacade};
pub use wire::{Section, UpdateResult, UpdateState, UpdateType};
pub use workspace::{Workspace, WorkspaceStore};
