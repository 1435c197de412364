use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use srv6_mesh_common::IdentityId;

use crate::Result;

/// Identities below this value are reserved for cluster scoped items.
const RESERVED_IDENTITIES: u32 = 128;

/// Maps a label set to a numeric identity. Resolution may fail or be pending;
/// endpoints without an identity are held but never selected.
pub trait IdentityAllocator: Send + Sync {
    fn resolve(&self, labels: &BTreeMap<String, String>) -> Result<IdentityId>;
}

/// Node-local identity derivation: a stable hash of the label set. Every node
/// resolves the same labels to the same identity without coordination.
pub struct LabelIdentityAllocator;

impl IdentityAllocator for LabelIdentityAllocator {
    fn resolve(&self, labels: &BTreeMap<String, String>) -> Result<IdentityId> {
        let bytes = serde_json::to_vec(labels)?;
        let digest = Sha256::digest(&bytes);
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&digest[..4]);
        let id = u32::from_be_bytes(raw);
        if id < RESERVED_IDENTITIES {
            Ok(id + RESERVED_IDENTITIES)
        } else {
            Ok(id)
        }
    }
}
