//! End-to-end coverage for the download pipeline: a loopback mock HTTP
//! origin feeding real `DwlParser`/`DownloadController` instances through
//! the happy path, a suspend/resume cycle, an abort, and a tampered
//! signature.

mod origin;

mod download;
mod daemon;
