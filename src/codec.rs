// model = "claude-opus-4-5"
// created = "2026-08-03"
// modified = "2026-08-05"
// driver = "Isaac Clayton"

//! Versioned snapshot encoding with integrity checksums.
//!
//! Managed objects are parked in the storage backend as envelopes:
//! an explicit format version tag, a domain-separated blake3 checksum,
//! and the JSON body. The version tag is how the format evolves (a
//! decoder rejects versions it does not know instead of misreading
//! them); the checksum catches corruption before a half-broken object
//! is handed back to the engine.

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::crdt::Crdt;
use crate::crdt::CrdtIdentifier;
use crate::error::Error;
use crate::error::Result;
use crate::managed::ManagedObject;
use crate::store::SnapshotStore;

/// Current snapshot format version.
pub const FORMAT_VERSION: u16 = 1;

/// Domain separation constant for snapshot checksums.
const TYPE_SNAPSHOT: u8 = 0x00;

/// Wire form of a stored snapshot.
#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u16,
    checksum: [u8; 32],
    body: Box<RawValue>,
}

/// Checksum over the version tag and the exact body bytes.
fn snapshot_checksum(version: u16, body: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[TYPE_SNAPSHOT]);
    hasher.update(&version.to_le_bytes());
    hasher.update(&(body.len() as u64).to_le_bytes());
    hasher.update(body);
    return *hasher.finalize().as_bytes();
}

fn codec_error(error: impl std::fmt::Display) -> Error {
    return Error::Codec(error.to_string());
}

/// Encode a managed object into a self-verifying envelope.
pub fn encode_snapshot<C>(object: &ManagedObject<C>) -> Result<Vec<u8>>
where
    C: Crdt + Serialize,
    C::Update: Serialize,
    C::Particle: Serialize,
{
    let body = serde_json::to_string(object).map_err(codec_error)?;
    let checksum = snapshot_checksum(FORMAT_VERSION, body.as_bytes());
    let envelope = Envelope {
        version: FORMAT_VERSION,
        checksum,
        body: RawValue::from_string(body).map_err(codec_error)?,
    };
    return serde_json::to_vec(&envelope).map_err(codec_error);
}

/// Decode and verify a stored snapshot.
pub fn decode_snapshot<C>(bytes: &[u8]) -> Result<ManagedObject<C>>
where
    C: Crdt + DeserializeOwned,
    C::Update: DeserializeOwned,
    C::Particle: DeserializeOwned,
{
    let text = std::str::from_utf8(bytes).map_err(codec_error)?;
    let envelope: Envelope = serde_json::from_str(text).map_err(codec_error)?;
    if envelope.version != FORMAT_VERSION {
        return Err(Error::Codec(format!(
            "unsupported snapshot format version {}",
            envelope.version
        )));
    }
    let body = envelope.body.get();
    if snapshot_checksum(envelope.version, body.as_bytes()) != envelope.checksum {
        return Err(Error::Codec("snapshot checksum mismatch".to_string()));
    }
    return serde_json::from_str(body).map_err(codec_error);
}

/// Encode a managed object and park it in the storage backend.
pub fn store_snapshot<C>(object: &ManagedObject<C>, store: &dyn SnapshotStore) -> Result<()>
where
    C: Crdt + Serialize,
    C::Update: Serialize,
    C::Particle: Serialize,
{
    let bytes = encode_snapshot(object)?;
    return store.write(object.id(), &bytes);
}

/// Load and decode a managed object from the storage backend.
pub fn load_snapshot<C>(
    id: &CrdtIdentifier,
    store: &dyn SnapshotStore,
) -> Result<Option<ManagedObject<C>>>
where
    C: Crdt + DeserializeOwned,
    C::Update: DeserializeOwned,
    C::Particle: DeserializeOwned,
{
    let Some(bytes) = store.read(id)? else {
        return Ok(None);
    };
    return Ok(Some(decode_snapshot(&bytes)?));
}
