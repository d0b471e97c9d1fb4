//! Resumable workspace: the on-disk record that lets a download survive a
//! daemon restart without re-fetching bytes it already verified.
//!
//! Persistence follows the same atomic-write discipline the daemon uses
//! for its chunk cache: write to a temp file in the same directory, then
//! `rename` over the real path so a crash mid-write never leaves a torn
//! record behind.

use crate::crypto::Sha1State;
use crate::wire::{Section, UpdateType, MAX_URI_LEN, PROLOG_SIZE};
use static_assertions::assert_eq_size;
use std::path::PathBuf;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

const RECORD_VERSION: u32 = 1;

/// Fixed-layout persisted workspace record.
///
/// Every field needed to resume a download lives here: how far into the
/// HTTP byte stream we are, which DWL section the parser is in, the
/// rolling CRC-32 state, and a full SHA-1 snapshot. A version mismatch on
/// load is treated as "no workspace", not an error — see
/// [`WorkspaceStore::load`].
#[derive(Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct WorkspaceRecord {
    record_version: u32,
    update_type: u8,
    uri_len: u16,
    uri: [u8; MAX_URI_LEN],
    /// Total bytes of the HTTP resource, from the initial HEAD. Zero
    /// until the size probe completes.
    package_size: u64,
    /// Bytes of the HTTP resource consumed so far (the next ranged GET
    /// resumes from this offset).
    offset: u64,
    section: u8,
    comment_size: u32,
    binary_size: u32,
    padding_size: u32,
    signature_size: u32,
    /// `packageCRC` as declared in the PROLOG.
    declared_crc: u32,
    /// Rolling CRC-32 over PROLOG..PADDING, resumable via `Crc32::resume`.
    crc_state: u32,
    /// Bytes remaining within the current section.
    section_remaining: u64,
    sha1_state: Sha1State,
}

assert_eq_size!(WorkspaceRecord, [u8; 407]);

/// In-memory view of the resumable workspace, the shape the controller
/// actually works with. [`WorkspaceStore`] converts to/from the packed
/// on-disk record.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub update_type: UpdateType,
    pub uri: String,
    pub package_size: u64,
    pub offset: u64,
    pub section: Section,
    pub comment_size: u32,
    pub binary_size: u32,
    pub padding_size: u32,
    pub signature_size: u32,
    pub declared_crc: u32,
    pub crc_state: u32,
    pub section_remaining: u64,
    pub sha1_state: Sha1State,
}

impl Workspace {
    pub fn new(uri: String, update_type: UpdateType) -> Self {
        Self {
            update_type,
            uri,
            package_size: 0,
            offset: 0,
            section: Section::Prolog,
            comment_size: 0,
            binary_size: 0,
            padding_size: 0,
            signature_size: 0,
            declared_crc: 0,
            crc_state: 0,
            section_remaining: PROLOG_SIZE as u64,
            sha1_state: Sha1State::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("URI of {0} bytes exceeds the {MAX_URI_LEN}-byte workspace record limit")]
    UriTooLong(usize),
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("persisted record is truncated or corrupt")]
    Corrupt,
    #[error(transparent)]
    Wire(#[from] crate::wire::WireError),
}

/// Reads and writes the single workspace record file at a configured path.
pub struct WorkspaceStore {
    path: PathBuf,
}

impl WorkspaceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the persisted workspace, or `None` if there is no file, the
    /// file is the wrong version, or it fails to parse — all three are
    /// treated as "start a fresh download" rather than a hard error.
    pub fn load(&self) -> Option<Workspace> {
        let bytes = std::fs::read(&self.path).ok()?;
        let record = WorkspaceRecord::read_from(bytes.as_slice())?;
        if { record.record_version } != RECORD_VERSION {
            return None;
        }
        record_to_workspace(&record).ok()
    }

    /// Atomically persists `workspace`: write to a sibling temp file, then
    /// rename over the real path.
    pub fn save(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        let record = workspace_to_record(workspace)?;
        let tmp_path = self.tmp_path();
        std::fs::write(&tmp_path, record.as_bytes())
            .map_err(|e| WorkspaceError::WriteFailed(tmp_path.clone(), e))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| WorkspaceError::WriteFailed(self.path.clone(), e))
    }

    /// Removes the workspace record. Called once a download reaches DONE,
    /// FAILED, or ABORTED, so a later `download` call starts clean.
    pub fn clear(&self) -> Result<(), WorkspaceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::WriteFailed(self.path.clone(), e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn workspace_to_record(ws: &Workspace) -> Result<WorkspaceRecord, WorkspaceError> {
    let uri_bytes = ws.uri.as_bytes();
    if uri_bytes.len() > MAX_URI_LEN {
        return Err(WorkspaceError::UriTooLong(uri_bytes.len()));
    }
    let mut uri = [0u8; MAX_URI_LEN];
    uri[..uri_bytes.len()].copy_from_slice(uri_bytes);

    Ok(WorkspaceRecord {
        record_version: RECORD_VERSION,
        update_type: ws.update_type.into(),
        uri_len: uri_bytes.len() as u16,
        uri,
        package_size: ws.package_size,
        offset: ws.offset,
        section: ws.section.into(),
        comment_size: ws.comment_size,
        binary_size: ws.binary_size,
        padding_size: ws.padding_size,
        signature_size: ws.signature_size,
        declared_crc: ws.declared_crc,
        crc_state: ws.crc_state,
        section_remaining: ws.section_remaining,
        sha1_state: ws.sha1_state.clone(),
    })
}

fn record_to_workspace(record: &WorkspaceRecord) -> Result<Workspace, WorkspaceError> {
    let uri_len = { record.uri_len } as usize;
    if uri_len > MAX_URI_LEN {
        return Err(WorkspaceError::Corrupt);
    }
    let uri = String::from_utf8(record.uri[..uri_len].to_vec()).map_err(|_| WorkspaceError::Corrupt)?;

    Ok(Workspace {
        update_type: UpdateType::try_from(record.update_type)?,
        uri,
        package_size: record.package_size,
        offset: record.offset,
        section: Section::try_from(record.section)?,
        comment_size: record.comment_size,
        binary_size: record.binary_size,
        padding_size: record.padding_size,
        signature_size: record.signature_size,
        declared_crc: record.declared_crc,
        crc_state: record.crc_state,
        section_remaining: record.section_remaining,
        sha1_state: record.sha1_state.clone(),
    })
}
