//! DWL wire format — on-wire types for the package envelope and the
//! LwM2M Firmware/Software Update state/result resources.
//!
//! The PROLOG is #[repr(C, packed)] with zerocopy derives for safe,
//! allocation-free parsing off the wire. There is no unsafe code in this
//! module.

use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Magic bytes identifying a DWL package. The first 8 bytes of every PROLOG.
pub const DWL_MAGIC: [u8; 8] = *b"\x23\x23LwM2M\x0a";

/// Upper bound on `signatureSize`. Fixes the Open Question in spec §9(b).
pub const MAX_SIGNATURE_SIZE: u32 = 512;

/// Upper bound on a package URI, including its terminator.
pub const MAX_URI_LEN: usize = 255;

/// Wire size of [`Prolog`] in bytes.
pub const PROLOG_SIZE: usize = 32;

/// Fixed length of the HEADER section that immediately follows PROLOG.
/// Vendor-reserved metadata bytes; opaque to the parser beyond being fed
/// to CRC/SHA-1 like every other covered section.
pub const HEADER_SIZE: usize = 16;

// ── PROLOG ────────────────────────────────────────────────────────────────────

/// Fixed-size header at the start of every DWL envelope.
///
/// Wire size: 32 bytes. Field order and widths are part of the wire
/// format — do not reorder or resize without bumping a protocol version.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct Prolog {
    /// Must equal [`DWL_MAGIC`]; any other value is `UNSUPPORTED_TYPE`.
    pub magic: [u8; 8],
    /// CRC-32 (zlib polynomial) declared by the producer, checked against
    /// the rolling CRC computed over PROLOG..PADDING.
    pub package_crc: u32,
    pub comment_size: u32,
    pub binary_size: u32,
    pub padding_size: u32,
    /// Bounded by [`MAX_SIGNATURE_SIZE`].
    pub signature_size: u32,
    pub update_type: u8,
    _reserved: [u8; 3],
}

assert_eq_size!(Prolog, [u8; 32]);

impl Prolog {
    pub fn new(
        package_crc: u32,
        comment_size: u32,
        binary_size: u32,
        padding_size: u32,
        signature_size: u32,
        update_type: UpdateType,
    ) -> Self {
        Self {
            magic: DWL_MAGIC,
            package_crc,
            comment_size,
            binary_size,
            padding_size,
            signature_size,
            update_type: update_type as u8,
            _reserved: [0; 3],
        }
    }

    pub fn magic_valid(&self) -> bool {
        self.magic == DWL_MAGIC
    }
}

// ── UpdateType ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum UpdateType {
    Firmware = 0x00,
    Software = 0x01,
}

impl TryFrom<u8> for UpdateType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(UpdateType::Firmware),
            0x01 => Ok(UpdateType::Software),
            other => Err(WireError::UnknownUpdateType(other)),
        }
    }
}

impl From<UpdateType> for u8 {
    fn from(t: UpdateType) -> u8 {
        t as u8
    }
}

// ── Section ───────────────────────────────────────────────────────────────────

/// Position of the DWL parser within the envelope. Persisted verbatim in
/// the workspace so a restart re-primes the parser without re-reading
/// earlier bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Section {
    Prolog = 0,
    Header = 1,
    Comment = 2,
    Binary = 3,
    Padding = 4,
    Signature = 5,
    Done = 6,
}

impl TryFrom<u8> for Section {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Section::Prolog),
            1 => Ok(Section::Header),
            2 => Ok(Section::Comment),
            3 => Ok(Section::Binary),
            4 => Ok(Section::Padding),
            5 => Ok(Section::Signature),
            6 => Ok(Section::Done),
            other => Err(WireError::UnknownSection(other)),
        }
    }
}

impl From<Section> for u8 {
    fn from(s: Section) -> u8 {
        s as u8
    }
}

// ── Update-state facade wire integers ────────────────────────────────────────

/// `state` resource of the LwM2M Firmware/Software Update object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum UpdateState {
    Idle = 0,
    Downloading = 1,
    Downloaded = 2,
    Updating = 3,
}

/// `result` resource of the LwM2M Firmware/Software Update object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum UpdateResult {
    Default = 0,
    Success = 1,
    NotEnoughFlash = 2,
    OutOfRam = 3,
    ConnectionLost = 4,
    IntegrityFailure = 5,
    UnsupportedType = 6,
    InvalidUri = 7,
    UpdateFailed = 8,
    UnsupportedProtocol = 9,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown update type byte: 0x{0:02x}")]
    UnknownUpdateType(u8),

    #[error("unknown section byte: 0x{0:02x}")]
    UnknownSection(u8),

    #[error("signature size {0} exceeds maximum {MAX_SIGNATURE_SIZE}")]
    SignatureTooLarge(u32),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
