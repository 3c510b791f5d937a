//! Canonical model for storagegraph
//!
//! Every provider (local POSIX/Windows filesystems, Google Drive, OneDrive, Dropbox) is
//! normalized into the same two record kinds:
//!
//! - [`StorageObject`]: one indexed file/folder (a graph vertex),
//! - [`ContainmentEdge`]: one half of a mirrored Contains/ContainedBy pair (a graph edge).
//!
//! Nothing in this crate knows how records were collected. Provider-specific shape only
//! survives inside [`RawMetadata`], which is kept verbatim for audit and reprocessing.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

pub mod file_name;

pub use file_name::{FileNameError, RunFileName, StreamKind, DEFAULT_FILE_PREFIX, RUN_FILE_SUFFIX};

// ============================================================================
// Identifiers & provenance
// ============================================================================

/// Opaque, run-unique identifier of a [`StorageObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Fresh random (v4) identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The `{producer identifier, version}` tag attached to every emitted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub ingester: Uuid,
    pub version: String,
}

impl Provenance {
    pub fn new(ingester: Uuid, version: impl Into<String>) -> Self {
        Self {
            ingester,
            version: version.into(),
        }
    }
}

// ============================================================================
// Timestamps & type flags
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimestampKind {
    Created,
    Modified,
    Accessed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub kind: TimestampKind,
    pub value: DateTime<Utc>,
    /// Free text, usually the provider field the value was read from.
    pub description: String,
}

/// Closed vocabulary used to classify objects for graph construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeFlag {
    Directory,
    RegularFile,
    Symlink,
    Other,
}

/// Ordered set of [`TypeFlag`]s (serialized as a list).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeFlags(BTreeSet<TypeFlag>);

impl TypeFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only(flag: TypeFlag) -> Self {
        let mut flags = Self::new();
        flags.insert(flag);
        flags
    }

    pub fn insert(&mut self, flag: TypeFlag) {
        self.0.insert(flag);
    }

    pub fn contains(&self, flag: TypeFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_directory(&self) -> bool {
        self.contains(TypeFlag::Directory)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<TypeFlag> for TypeFlags {
    fn from_iter<I: IntoIterator<Item = TypeFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Raw provider metadata
// ============================================================================

/// Provider families the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Posix,
    Windows,
    GoogleDrive,
    OneDrive,
    Dropbox,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Posix,
        ProviderKind::Windows,
        ProviderKind::GoogleDrive,
        ProviderKind::OneDrive,
        ProviderKind::Dropbox,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Posix => "posix",
            ProviderKind::Windows => "windows",
            ProviderKind::GoogleDrive => "google-drive",
            ProviderKind::OneDrive => "onedrive",
            ProviderKind::Dropbox => "dropbox",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider record, unmodified, plus when it was collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub collected_at: DateTime<Utc>,
    pub record: serde_json::Value,
}

/// Verbatim copy of the original provider record, tagged by provider family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", content = "raw", rename_all = "kebab-case")]
pub enum RawMetadata {
    Posix(RawRecord),
    Windows(RawRecord),
    GoogleDrive(RawRecord),
    OneDrive(RawRecord),
    Dropbox(RawRecord),
}

/// Encoding label written next to [`EncodedRawMetadata::data`].
pub const RAW_METADATA_ENCODING: &str = "cbor+base64";

#[derive(Debug, thiserror::Error)]
pub enum RawMetadataError {
    #[error("CBOR encode failed: {0}")]
    Encode(String),
    #[error("CBOR decode failed: {0}")]
    Decode(String),
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported raw metadata encoding `{0}`")]
    UnsupportedEncoding(String),
}

/// Transport-safe form of [`RawMetadata`] used in the Objects stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedRawMetadata {
    pub provider: ProviderKind,
    pub collected_at: DateTime<Utc>,
    pub encoding: String,
    pub data: String,
}

impl RawMetadata {
    pub fn new(provider: ProviderKind, collected_at: DateTime<Utc>, record: serde_json::Value) -> Self {
        let raw = RawRecord {
            collected_at,
            record,
        };
        match provider {
            ProviderKind::Posix => RawMetadata::Posix(raw),
            ProviderKind::Windows => RawMetadata::Windows(raw),
            ProviderKind::GoogleDrive => RawMetadata::GoogleDrive(raw),
            ProviderKind::OneDrive => RawMetadata::OneDrive(raw),
            ProviderKind::Dropbox => RawMetadata::Dropbox(raw),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            RawMetadata::Posix(_) => ProviderKind::Posix,
            RawMetadata::Windows(_) => ProviderKind::Windows,
            RawMetadata::GoogleDrive(_) => ProviderKind::GoogleDrive,
            RawMetadata::OneDrive(_) => ProviderKind::OneDrive,
            RawMetadata::Dropbox(_) => ProviderKind::Dropbox,
        }
    }

    pub fn raw(&self) -> &RawRecord {
        match self {
            RawMetadata::Posix(raw)
            | RawMetadata::Windows(raw)
            | RawMetadata::GoogleDrive(raw)
            | RawMetadata::OneDrive(raw)
            | RawMetadata::Dropbox(raw) => raw,
        }
    }

    pub fn record(&self) -> &serde_json::Value {
        &self.raw().record
    }

    /// Re-encode the record as CBOR, then base64.
    pub fn encode_transport(&self) -> Result<EncodedRawMetadata, RawMetadataError> {
        let raw = self.raw();
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&raw.record, &mut bytes)
            .map_err(|e| RawMetadataError::Encode(e.to_string()))?;

        Ok(EncodedRawMetadata {
            provider: self.provider(),
            collected_at: raw.collected_at,
            encoding: RAW_METADATA_ENCODING.to_string(),
            data: BASE64.encode(bytes),
        })
    }
}

impl EncodedRawMetadata {
    pub fn decode(&self) -> Result<RawMetadata, RawMetadataError> {
        if self.encoding != RAW_METADATA_ENCODING {
            return Err(RawMetadataError::UnsupportedEncoding(self.encoding.clone()));
        }
        let bytes = BASE64.decode(self.data.as_bytes())?;
        let record: serde_json::Value = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| RawMetadataError::Decode(e.to_string()))?;
        Ok(RawMetadata::new(self.provider, self.collected_at, record))
    }
}

// ============================================================================
// Vertices
// ============================================================================

/// Canonical, provider-independent representation of one indexed file/folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageObject {
    pub id: ObjectId,
    /// Path or URI.
    pub locator: String,
    pub label: String,
    pub size: u64,
    pub timestamps: Vec<Timestamp>,
    pub type_flags: TypeFlags,
    /// Names of every bit pattern / marker the attribute mapper matched.
    #[serde(default)]
    pub attributes: Vec<String>,
    pub provenance: Provenance,
    pub raw: RawMetadata,
}

impl StorageObject {
    pub fn is_directory(&self) -> bool {
        self.type_flags.is_directory()
    }

    pub fn timestamp(&self, kind: TimestampKind) -> Option<&Timestamp> {
        self.timestamps.iter().find(|t| t.kind == kind)
    }
}

// ============================================================================
// Edges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipTag {
    /// `object1` is the child, `object2` the parent.
    Contains,
    /// `object1` is the parent, `object2` the child.
    ContainedBy,
}

/// Default relationship-type identifier for [`RelationshipTag::Contains`].
pub const CONTAINS_RELATIONSHIP_ID: Uuid = Uuid::from_u128(0x9c1e4f2a_7b3d_4e8a_a1c6_52d8f0b3e701);
/// Default relationship-type identifier for [`RelationshipTag::ContainedBy`].
pub const CONTAINED_BY_RELATIONSHIP_ID: Uuid =
    Uuid::from_u128(0x4e7a0d1b_2c9f_4b63_8d15_e6a3b7c9f402);

/// Fixed identifiers the downstream loader uses for each relationship tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipVocabulary {
    pub contains: Uuid,
    pub contained_by: Uuid,
}

impl Default for RelationshipVocabulary {
    fn default() -> Self {
        Self {
            contains: CONTAINS_RELATIONSHIP_ID,
            contained_by: CONTAINED_BY_RELATIONSHIP_ID,
        }
    }
}

impl RelationshipVocabulary {
    pub fn id_for(&self, tag: RelationshipTag) -> Uuid {
        match tag {
            RelationshipTag::Contains => self.contains,
            RelationshipTag::ContainedBy => self.contained_by,
        }
    }
}

/// One half of a mirrored containment pair.
///
/// Direction convention, applied everywhere:
///
/// - `Contains`: `object1` = child, `object2` = parent
/// - `ContainedBy`: `object1` = parent, `object2` = child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentEdge {
    /// Record id; not stable across runs.
    pub id: Uuid,
    pub tag: RelationshipTag,
    pub object1: ObjectId,
    pub object2: ObjectId,
    pub provenance: Provenance,
}

impl ContainmentEdge {
    /// Build the mirrored `[Contains, ContainedBy]` pair for `parent` ⊇ `child`.
    ///
    /// Returns `None` for a self-reference; a pair is either emitted whole or not at all.
    pub fn pair(
        parent: ObjectId,
        child: ObjectId,
        provenance: &Provenance,
    ) -> Option<[ContainmentEdge; 2]> {
        if parent == child {
            return None;
        }
        Some([
            ContainmentEdge {
                id: Uuid::new_v4(),
                tag: RelationshipTag::Contains,
                object1: child,
                object2: parent,
                provenance: provenance.clone(),
            },
            ContainmentEdge {
                id: Uuid::new_v4(),
                tag: RelationshipTag::ContainedBy,
                object1: parent,
                object2: child,
                provenance: provenance.clone(),
            },
        ])
    }

    /// The identity of an edge as far as idempotence is concerned.
    pub fn triple(&self) -> (ObjectId, ObjectId, RelationshipTag) {
        (self.object1, self.object2, self.tag)
    }

    pub fn parent(&self) -> ObjectId {
        match self.tag {
            RelationshipTag::Contains => self.object2,
            RelationshipTag::ContainedBy => self.object1,
        }
    }

    pub fn child(&self) -> ObjectId {
        match self.tag {
            RelationshipTag::Contains => self.object1,
            RelationshipTag::ContainedBy => self.object2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn provenance() -> Provenance {
        Provenance::new(Uuid::from_u128(7), "1.0")
    }

    #[test]
    fn pair_follows_direction_convention() {
        let parent = ObjectId::new_random();
        let child = ObjectId::new_random();
        let [contains, contained_by] = ContainmentEdge::pair(parent, child, &provenance()).unwrap();

        assert_eq!(contains.tag, RelationshipTag::Contains);
        assert_eq!((contains.object1, contains.object2), (child, parent));
        assert_eq!(contained_by.tag, RelationshipTag::ContainedBy);
        assert_eq!((contained_by.object1, contained_by.object2), (parent, child));
        assert_eq!(contains.parent(), contained_by.parent());
        assert_eq!(contains.child(), contained_by.child());
        assert_ne!(contains.id, contained_by.id);
    }

    #[test]
    fn pair_refuses_self_reference() {
        let id = ObjectId::new_random();
        assert!(ContainmentEdge::pair(id, id, &provenance()).is_none());
    }

    #[test]
    fn raw_metadata_survives_transport_encoding() {
        let collected_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = serde_json::json!({
            "id": "01ABC",
            "name": "report.pdf",
            "size": 1024,
            "parentReference": { "id": "01ROOT", "path": "/drive/root:" },
            "shared": null,
            "tags": ["a", "b"],
        });
        let raw = RawMetadata::new(ProviderKind::OneDrive, collected_at, record.clone());

        let encoded = raw.encode_transport().unwrap();
        assert_eq!(encoded.provider, ProviderKind::OneDrive);
        assert_eq!(encoded.encoding, RAW_METADATA_ENCODING);
        assert!(encoded
            .data
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')));

        let decoded = encoded.decode().unwrap();
        assert_eq!(decoded, raw);
        assert_eq!(decoded.record(), &record);
    }

    #[test]
    fn raw_metadata_is_tagged_by_provider() {
        let collected_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let raw = RawMetadata::new(ProviderKind::Dropbox, collected_at, serde_json::json!({"id": "id:1"}));
        let json = serde_json::to_value(&raw).unwrap();
        assert_eq!(json["provider"], "dropbox");
        assert_eq!(json["raw"]["record"]["id"], "id:1");
    }

    #[test]
    fn provider_names_parse_back() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::parse("OneDrive"), Some(ProviderKind::OneDrive));
        assert_eq!(ProviderKind::parse("icloud"), None);
    }

    #[test]
    fn type_flags_serialize_as_sorted_list() {
        let flags: TypeFlags = [TypeFlag::Symlink, TypeFlag::Directory].into_iter().collect();
        let json = serde_json::to_value(&flags).unwrap();
        assert_eq!(json, serde_json::json!(["Directory", "Symlink"]));
        assert!(flags.is_directory());
    }
}
