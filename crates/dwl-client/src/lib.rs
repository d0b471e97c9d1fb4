//! DWL download client: the HTTP/1.1 subset, the DWL envelope parser, and
//! the controller that drives them against a resumable workspace.
//!
//! `dwl-core` owns the wire types, integrity engine, config, credentials,
//! and event model; this crate is the component that actually talks to
//! the network.

pub mod controller;
pub mod dwl;
pub mod error;
pub mod facade;
pub mod http;
pub mod sink;
pub mod transport;
pub mod uri;

pub use controller::{ControlFlags, DownloadController};
pub use error::DownloadError;
pub use facade::{FacadeHost, PlatformUpdateHook, UnimplementedUpdateHook};
pub use sink::{FileSink, FileSinkFactory, WriteSink, WriteSinkFactory};
