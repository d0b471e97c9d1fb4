//! Credential interface (read side).
//!
//! The core only ever consumes `FwPublicKey`/`SwPublicKey`; the remaining
//! slots exist so the interface matches what a full LwM2M device-side
//! stack exposes (bootstrap/device-management PSKs and server addresses),
//! but this crate's credential store never reads them back — sourcing
//! and provisioning the bootstrap credentials is out of scope here.

use crate::config::KeysConfig;
use crate::wire::UpdateType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSlot {
    FwPublicKey,
    SwPublicKey,
    DmPskId,
    DmPsk,
    DmAddress,
    BsPskId,
    BsPsk,
    BsAddress,
}

pub trait CredentialStore: Send + Sync {
    /// Returns the slot's bytes, or `None` if unpopulated.
    fn get(&self, slot: CredentialSlot) -> Option<Vec<u8>>;
}

/// Compiled-in fallback public keys, used when no path is configured.
///
/// These are placeholder DER blobs for an environment with no real
/// provisioned key; a deployment always overrides them via
/// `keys.firmware_public_key_path` / `keys.software_public_key_path`.
const FALLBACK_FW_PUBLIC_KEY_DER: &[u8] = &[];
const FALLBACK_SW_PUBLIC_KEY_DER: &[u8] = &[];

/// Reads `FwPublicKey`/`SwPublicKey` from the paths in [`KeysConfig`],
/// falling back to the compiled-in bytes above. Every other slot reads as
/// `None` — this store only backs what the core actually uses.
pub struct FileCredentialStore {
    keys: KeysConfig,
}

impl FileCredentialStore {
    pub fn new(keys: KeysConfig) -> Self {
        Self { keys }
    }

    pub fn public_key_der(&self, update_type: UpdateType) -> Option<Vec<u8>> {
        match update_type {
            UpdateType::Firmware => self.get(CredentialSlot::FwPublicKey),
            UpdateType::Software => self.get(CredentialSlot::SwPublicKey),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, slot: CredentialSlot) -> Option<Vec<u8>> {
        match slot {
            CredentialSlot::FwPublicKey => read_or_fallback(
                self.keys.firmware_public_key_path.as_deref(),
                FALLBACK_FW_PUBLIC_KEY_DER,
            ),
            CredentialSlot::SwPublicKey => read_or_fallback(
                self.keys.software_public_key_path.as_deref(),
                FALLBACK_SW_PUBLIC_KEY_DER,
            ),
            _ => None,
        }
    }
}

fn read_or_fallback(path: Option<&std::path::Path>, fallback: &[u8]) -> Option<Vec<u8>> {
    match path {
        Some(p) => std::fs::read(p).ok().or_else(|| non_empty(fallback)),
        None => non_empty(fallback),
    }
}

fn non_empty(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.is_empty() {
        None
    } else {
        Some(bytes.to_vec())
    }
}
