//! Line shapes of the Objects and Relationships streams.

use serde::{Deserialize, Serialize};
use storagegraph_model::{
    ContainmentEdge, EncodedRawMetadata, ObjectId, Provenance, RawMetadataError,
    RelationshipTag, RelationshipVocabulary, StorageObject, Timestamp, TypeFlags,
};
use uuid::Uuid;

/// One line of the Objects stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub uri: String,
    pub label: String,
    pub size: u64,
    pub timestamps: Vec<Timestamp>,
    pub type_flags: TypeFlags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    pub provenance: Provenance,
    pub raw_metadata: EncodedRawMetadata,
}

impl ObjectRecord {
    pub fn from_object(object: &StorageObject) -> Result<Self, RawMetadataError> {
        Ok(Self {
            id: object.id,
            uri: object.locator.clone(),
            label: object.label.clone(),
            size: object.size,
            timestamps: object.timestamps.clone(),
            type_flags: object.type_flags.clone(),
            attributes: object.attributes.clone(),
            provenance: object.provenance.clone(),
            raw_metadata: object.raw.encode_transport()?,
        })
    }

    /// Rebuild the canonical object, decoding the raw metadata.
    pub fn into_object(self) -> Result<StorageObject, RawMetadataError> {
        let raw = self.raw_metadata.decode()?;
        Ok(StorageObject {
            id: self.id,
            locator: self.uri,
            label: self.label,
            size: self.size,
            timestamps: self.timestamps,
            type_flags: self.type_flags,
            attributes: self.attributes,
            provenance: self.provenance,
            raw,
        })
    }
}

/// One line of the Relationships stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: Uuid,
    /// Fixed identifier of `tag` in the loader's vocabulary.
    pub relationship_type: Uuid,
    pub tag: RelationshipTag,
    pub object1: ObjectId,
    pub object2: ObjectId,
    pub provenance: Provenance,
}

impl RelationshipRecord {
    pub fn from_edge(edge: &ContainmentEdge, vocabulary: &RelationshipVocabulary) -> Self {
        Self {
            id: edge.id,
            relationship_type: vocabulary.id_for(edge.tag),
            tag: edge.tag,
            object1: edge.object1,
            object2: edge.object2,
            provenance: edge.provenance.clone(),
        }
    }
}
