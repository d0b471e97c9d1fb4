//! Component D — DWL envelope parser.
//!
//! A typed-length-value state machine walking PROLOG → HEADER → COMMENT →
//! BINARY → PADDING → SIGNATURE → DONE. Every section's bytes except
//! SIGNATURE are folded into the running CRC-32 and SHA-1 engines as they
//! arrive; BINARY bytes are additionally handed back to the caller for
//! forwarding to the platform write sink.

use bytes::Bytes;
use dwl_core::crypto::{Crc32, Sha1State};
use dwl_core::wire::{Prolog, Section, UpdateType, HEADER_SIZE, MAX_SIGNATURE_SIZE, PROLOG_SIZE};
use dwl_core::workspace::Workspace;
use zerocopy::FromBytes;

#[derive(Debug, thiserror::Error)]
pub enum DwlError {
    #[error("package magic does not match the expected DWL envelope")]
    BadMagic,
    #[error("declared signature size {0} exceeds the {MAX_SIGNATURE_SIZE}-octet bound")]
    SignatureTooLarge(u32),
    #[error("package CRC-32 mismatch: declared 0x{declared:08x}, computed 0x{computed:08x}")]
    CrcMismatch { declared: u32, computed: u32 },
    #[error("trailing bytes after the SIGNATURE section")]
    TrailingBytes,
}

/// Produced as the parser consumes bytes.
#[derive(Debug)]
pub enum ParseEvent {
    /// BINARY-section bytes, in arrival order, ready for
    /// `writePackageData`.
    Binary(Bytes),
    /// The SIGNATURE section is fully buffered and the CRC check against
    /// `packageCRC` has already run. `digest` is the finalised SHA-1 over
    /// PROLOG..PADDING; `signature` is the raw signature bytes. The
    /// caller (component G) still owns RSA-PSS verification since that
    /// needs a public key from the credential store.
    SignatureReady { digest: [u8; 20], signature: Vec<u8> },
}

pub struct DwlParser {
    section: Section,
    section_remaining: u64,
    comment_size: u32,
    binary_size: u32,
    padding_size: u32,
    signature_size: u32,
    declared_crc: u32,
    crc: Crc32,
    sha1: Sha1State,
    prolog_buf: Vec<u8>,
    signature_buf: Vec<u8>,
}

impl DwlParser {
    /// Starts a brand-new parse: no prolog fields are known yet.
    pub fn new() -> Self {
        Self {
            section: Section::Prolog,
            section_remaining: PROLOG_SIZE as u64,
            comment_size: 0,
            binary_size: 0,
            padding_size: 0,
            signature_size: 0,
            declared_crc: 0,
            crc: Crc32::new(),
            sha1: Sha1State::new(),
            prolog_buf: Vec::with_capacity(PROLOG_SIZE),
            signature_buf: Vec::new(),
        }
    }

    /// Re-primes from a persisted workspace: the exact resumption
    /// contract of §4.D — `section`, `subsection` (here `section_remaining`),
    /// prolog field counters, and the SHA-1 context snapshot.
    pub fn resume(ws: &Workspace) -> Self {
        Self {
            section: ws.section,
            section_remaining: ws.section_remaining,
            comment_size: ws.comment_size,
            binary_size: ws.binary_size,
            padding_size: ws.padding_size,
            signature_size: ws.signature_size,
            declared_crc: ws.declared_crc,
            crc: Crc32::resume(ws.crc_state),
            sha1: ws.sha1_state.clone(),
            prolog_buf: Vec::with_capacity(PROLOG_SIZE),
            signature_buf: Vec::with_capacity(ws.signature_size as usize),
        }
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn section_remaining(&self) -> u64 {
        self.section_remaining
    }

    pub fn crc_state(&self) -> u32 {
        self.crc.checksum()
    }

    pub fn sha1_state(&self) -> Sha1State {
        self.sha1.clone()
    }

    pub fn prolog_fields(&self) -> (u32, u32, u32, u32, u32) {
        (self.comment_size, self.binary_size, self.padding_size, self.signature_size, self.declared_crc)
    }

    /// Feeds the next slice of HTTP body bytes, consuming all of it
    /// (accumulating partial state internally where a logical unit spans
    /// more than one call, e.g. a PROLOG split across two TCP reads).
    pub fn feed(&mut self, mut input: &[u8], update_type: UpdateType) -> Result<Vec<ParseEvent>, DwlError> {
        let mut events = Vec::new();

        while !input.is_empty() {
            match self.section {
                Section::Prolog => {
                    let need = PROLOG_SIZE - self.prolog_buf.len();
                    let take = need.min(input.len());
                    self.prolog_buf.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    if self.prolog_buf.len() < PROLOG_SIZE {
                        break;
                    }

                    let prolog = Prolog::read_from(self.prolog_buf.as_slice()).ok_or(DwlError::BadMagic)?;
                    if !prolog.magic_valid() {
                        return Err(DwlError::BadMagic);
                    }
                    if { prolog.signature_size } > MAX_SIGNATURE_SIZE {
                        return Err(DwlError::SignatureTooLarge(prolog.signature_size));
                    }
                    let _ = update_type;

                    self.crc.update(&self.prolog_buf);
                    self.sha1.update(&self.prolog_buf);

                    self.comment_size = prolog.comment_size;
                    self.binary_size = prolog.binary_size;
                    self.padding_size = prolog.padding_size;
                    self.signature_size = prolog.signature_size;
                    self.declared_crc = prolog.package_crc;

                    self.section = Section::Header;
                    self.section_remaining = HEADER_SIZE as u64;
                }
                Section::Header => {
                    self.consume_covered(&mut input);
                    if self.section_remaining == 0 {
                        self.section = Section::Comment;
                        self.section_remaining = self.comment_size as u64;
                    } else {
                        break;
                    }
                }
                Section::Comment => {
                    self.consume_covered(&mut input);
                    if self.section_remaining == 0 {
                        self.section = Section::Binary;
                        self.section_remaining = self.binary_size as u64;
                    } else {
                        break;
                    }
                }
                Section::Binary => {
                    if self.section_remaining == 0 {
                        self.section = Section::Padding;
                        self.section_remaining = self.padding_size as u64;
                        continue;
                    }
                    let take = (input.len() as u64).min(self.section_remaining) as usize;
                    if take > 0 {
                        let slice = &input[..take];
                        self.crc.update(slice);
                        self.sha1.update(slice);
                        events.push(ParseEvent::Binary(Bytes::copy_from_slice(slice)));
                        self.section_remaining -= take as u64;
                        input = &input[take..];
                    }
                    if self.section_remaining == 0 {
                        self.section = Section::Padding;
                        self.section_remaining = self.padding_size as u64;
                    } else {
                        break;
                    }
                }
                Section::Padding => {
                    self.consume_covered(&mut input);
                    if self.section_remaining == 0 {
                        self.section = Section::Signature;
                        self.section_remaining = self.signature_size as u64;

                        let computed = self.crc.checksum();
                        if computed != self.declared_crc {
                            return Err(DwlError::CrcMismatch { declared: self.declared_crc, computed });
                        }
                    } else {
                        break;
                    }
                }
                Section::Signature => {
                    let take = (input.len() as u64).min(self.section_remaining) as usize;
                    if take > 0 {
                        self.signature_buf.extend_from_slice(&input[..take]);
                        self.section_remaining -= take as u64;
                        input = &input[take..];
                    }
                    if self.section_remaining == 0 {
                        let digest = self.sha1.finalize();
                        events.push(ParseEvent::SignatureReady {
                            digest,
                            signature: std::mem::take(&mut self.signature_buf),
                        });
                        self.section = Section::Done;
                    } else {
                        break;
                    }
                }
                Section::Done => {
                    if !input.is_empty() {
                        return Err(DwlError::TrailingBytes);
                    }
                    break;
                }
            }
        }

        Ok(events)
    }

    /// Consumes up to `section_remaining` bytes of `input`, folding them
    /// into CRC/SHA-1 without emitting anything — shared by HEADER,
    /// COMMENT, and PADDING, which are covered-but-opaque regions.
    fn consume_covered(&mut self, input: &mut &[u8]) {
        let take = (input.len() as u64).min(self.section_remaining) as usize;
        if take == 0 {
            return;
        }
        let slice = &input[..take];
        self.crc.update(slice);
        self.sha1.update(slice);
        self.section_remaining -= take as u64;
        *input = &input[take..];
    }
}

impl Default for DwlParser {
    fn default() -> Self {
        Self::new()
    }
}
