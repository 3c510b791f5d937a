//! Provider profiles.
//!
//! A profile is the declarative description of one provider's record shape: where the
//! locator, size, label, timestamps, type indicator and parent hint live (as JSON pointers),
//! how a stable identifier can be recovered, and which containment strategy applies.
//!
//! Profiles are plain immutable values handed to the pipeline. The built-in ones cover the
//! local POSIX / Windows collectors and the Google Drive, OneDrive and Dropbox listing APIs.

use crate::attributes::MarkerVocabulary;
use crate::error::{IngestError, Result};
use crate::path::PathStyle;
use regex::Regex;
use serde::{Deserialize, Serialize};
use storagegraph_model::{ProviderKind, TimestampKind, TypeFlag};
use uuid::Uuid;

/// Default ingester identifiers (`Provenance::ingester`) for the built-in profiles.
pub const POSIX_SERVICE_ID: Uuid = Uuid::from_u128(0x0b8f3c52_61a4_4d0e_9a7b_3f2e1d0c9b01);
pub const WINDOWS_SERVICE_ID: Uuid = Uuid::from_u128(0x0b8f3c52_61a4_4d0e_9a7b_3f2e1d0c9b02);
pub const GOOGLE_DRIVE_SERVICE_ID: Uuid = Uuid::from_u128(0x0b8f3c52_61a4_4d0e_9a7b_3f2e1d0c9b03);
pub const ONEDRIVE_SERVICE_ID: Uuid = Uuid::from_u128(0x0b8f3c52_61a4_4d0e_9a7b_3f2e1d0c9b04);
pub const DROPBOX_SERVICE_ID: Uuid = Uuid::from_u128(0x0b8f3c52_61a4_4d0e_9a7b_3f2e1d0c9b05);

/// Matches a UUID, optionally wrapped in braces (`"{UUID},2"` style entity tags).
pub const BRACED_UUID_PATTERN: &str =
    r"\{?([0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})\}?";

const GOOGLE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const GOOGLE_SHORTCUT_MIME: &str = "application/vnd.google-apps.shortcut";

// ============================================================================
// Rules
// ============================================================================

/// Where the locator (path or URI) comes from. Sources are tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LocatorSource {
    Field { pointer: String },
    /// `directory` + separator + `name`.
    Join { directory: String, name: String },
    /// `prefix` followed by the value at `pointer` (e.g. an "open by id" URL).
    Prefixed { prefix: String, pointer: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRule {
    pub pointer: String,
    /// Size used for directory records that omit one (cloud folders usually do).
    #[serde(default)]
    pub directory_default: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampEncoding {
    Rfc3339,
    EpochSeconds,
    EpochNanos,
}

/// One row of the declarative timestamp table. Earlier rows win for the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampField {
    pub pointer: String,
    pub kind: TimestampKind,
    pub encoding: TimestampEncoding,
}

impl TimestampField {
    fn new(pointer: &str, kind: TimestampKind, encoding: TimestampEncoding) -> Self {
        Self {
            pointer: pointer.to_string(),
            kind,
            encoding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "indicator", rename_all = "snake_case")]
pub enum IndicatorRule {
    PosixMode { pointer: String },
    WindowsAttributes { pointer: String },
    /// A string field compared against the vocabulary.
    Marker {
        pointer: String,
        vocabulary: MarkerVocabulary,
    },
    /// The first of `facets` present as a key of the record is the marker.
    Facet {
        facets: Vec<String>,
        vocabulary: MarkerVocabulary,
    },
}

/// Recover a stable identifier from an opaque field (first capture group must be a UUID).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRule {
    pub pointer: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ContainmentRule {
    /// Parent path read from `parent_pointer`, or computed from the locator.
    PathKeyed {
        style: PathStyle,
        #[serde(default)]
        parent_pointer: Option<String>,
    },
    /// Parent id(s) at `parent_pointer` refer to other records' `id_pointer`.
    NativeIdKeyed {
        id_pointer: String,
        parent_pointer: String,
    },
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub name: String,
    pub kind: ProviderKind,
    pub service_id: Uuid,
    pub locator: Vec<LocatorSource>,
    #[serde(default)]
    pub label: Option<String>,
    pub size: SizeRule,
    #[serde(default)]
    pub timestamps: Vec<TimestampField>,
    pub indicator: IndicatorRule,
    #[serde(default)]
    pub identity: Option<IdentityRule>,
    pub containment: ContainmentRule,
}

impl ProviderProfile {
    pub fn builtin(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Posix => Self::posix(),
            ProviderKind::Windows => Self::windows(),
            ProviderKind::GoogleDrive => Self::google_drive(),
            ProviderKind::OneDrive => Self::onedrive(),
            ProviderKind::Dropbox => Self::dropbox(),
        }
    }

    pub fn builtins() -> Vec<Self> {
        ProviderKind::ALL.into_iter().map(Self::builtin).collect()
    }

    /// Local filesystem records as produced by `stat(2)`-style collectors.
    pub fn posix() -> Self {
        use TimestampEncoding::{EpochNanos, EpochSeconds};
        use TimestampKind::*;

        Self {
            name: "posix".to_string(),
            kind: ProviderKind::Posix,
            service_id: POSIX_SERVICE_ID,
            locator: local_locator(),
            label: Some("/name".to_string()),
            size: SizeRule {
                pointer: "/st_size".to_string(),
                directory_default: None,
            },
            timestamps: vec![
                TimestampField::new("/st_birthtime_ns", Created, EpochNanos),
                TimestampField::new("/st_birthtime", Created, EpochSeconds),
                TimestampField::new("/st_mtime_ns", Modified, EpochNanos),
                TimestampField::new("/st_mtime", Modified, EpochSeconds),
                TimestampField::new("/st_atime_ns", Accessed, EpochNanos),
                TimestampField::new("/st_atime", Accessed, EpochSeconds),
                TimestampField::new("/st_ctime_ns", Changed, EpochNanos),
                TimestampField::new("/st_ctime", Changed, EpochSeconds),
            ],
            indicator: IndicatorRule::PosixMode {
                pointer: "/st_mode".to_string(),
            },
            identity: None,
            containment: ContainmentRule::PathKeyed {
                style: PathStyle::POSIX,
                parent_pointer: Some("/directory".to_string()),
            },
        }
    }

    /// Local Windows records (`st_ctime` is the creation time there).
    pub fn windows() -> Self {
        use TimestampEncoding::{EpochNanos, EpochSeconds};
        use TimestampKind::*;

        Self {
            name: "windows".to_string(),
            kind: ProviderKind::Windows,
            service_id: WINDOWS_SERVICE_ID,
            locator: local_locator(),
            label: Some("/name".to_string()),
            size: SizeRule {
                pointer: "/st_size".to_string(),
                directory_default: Some(0),
            },
            timestamps: vec![
                TimestampField::new("/st_birthtime_ns", Created, EpochNanos),
                TimestampField::new("/st_ctime_ns", Created, EpochNanos),
                TimestampField::new("/st_ctime", Created, EpochSeconds),
                TimestampField::new("/st_mtime_ns", Modified, EpochNanos),
                TimestampField::new("/st_mtime", Modified, EpochSeconds),
                TimestampField::new("/st_atime_ns", Accessed, EpochNanos),
                TimestampField::new("/st_atime", Accessed, EpochSeconds),
            ],
            indicator: IndicatorRule::WindowsAttributes {
                pointer: "/st_file_attributes".to_string(),
            },
            identity: None,
            containment: ContainmentRule::PathKeyed {
                style: PathStyle::WINDOWS,
                parent_pointer: Some("/directory".to_string()),
            },
        }
    }

    /// Google Drive `files.list` entries (v3 field names).
    pub fn google_drive() -> Self {
        use TimestampKind::*;

        Self {
            name: "google-drive".to_string(),
            kind: ProviderKind::GoogleDrive,
            service_id: GOOGLE_DRIVE_SERVICE_ID,
            locator: vec![
                LocatorSource::Field {
                    pointer: "/webViewLink".to_string(),
                },
                LocatorSource::Prefixed {
                    prefix: "https://drive.google.com/open?id=".to_string(),
                    pointer: "/id".to_string(),
                },
            ],
            label: Some("/name".to_string()),
            size: SizeRule {
                pointer: "/size".to_string(),
                directory_default: Some(0),
            },
            timestamps: vec![
                TimestampField::new("/createdTime", Created, TimestampEncoding::Rfc3339),
                TimestampField::new("/modifiedTime", Modified, TimestampEncoding::Rfc3339),
                TimestampField::new("/viewedByMeTime", Accessed, TimestampEncoding::Rfc3339),
            ],
            indicator: IndicatorRule::Marker {
                pointer: "/mimeType".to_string(),
                vocabulary: MarkerVocabulary {
                    directory: vec![GOOGLE_FOLDER_MIME.to_string()],
                    regular_file: Vec::new(),
                    symlink: vec![GOOGLE_SHORTCUT_MIME.to_string()],
                    otherwise: Some(TypeFlag::RegularFile),
                    case_insensitive: false,
                },
            },
            identity: None,
            containment: ContainmentRule::NativeIdKeyed {
                id_pointer: "/id".to_string(),
                parent_pointer: "/parents".to_string(),
            },
        }
    }

    /// OneDrive / Microsoft Graph `driveItem` resources.
    pub fn onedrive() -> Self {
        use TimestampKind::*;

        Self {
            name: "onedrive".to_string(),
            kind: ProviderKind::OneDrive,
            service_id: ONEDRIVE_SERVICE_ID,
            locator: vec![
                LocatorSource::Field {
                    pointer: "/webUrl".to_string(),
                },
                LocatorSource::Join {
                    directory: "/parentReference/path".to_string(),
                    name: "/name".to_string(),
                },
                LocatorSource::Prefixed {
                    prefix: "https://graph.microsoft.com/v1.0/me/drive/items/".to_string(),
                    pointer: "/id".to_string(),
                },
            ],
            label: Some("/name".to_string()),
            size: SizeRule {
                pointer: "/size".to_string(),
                directory_default: Some(0),
            },
            timestamps: vec![
                TimestampField::new("/createdDateTime", Created, TimestampEncoding::Rfc3339),
                TimestampField::new(
                    "/fileSystemInfo/createdDateTime",
                    Created,
                    TimestampEncoding::Rfc3339,
                ),
                TimestampField::new(
                    "/lastModifiedDateTime",
                    Modified,
                    TimestampEncoding::Rfc3339,
                ),
                TimestampField::new(
                    "/fileSystemInfo/lastAccessedDateTime",
                    Accessed,
                    TimestampEncoding::Rfc3339,
                ),
            ],
            indicator: IndicatorRule::Facet {
                facets: vec![
                    "folder".to_string(),
                    "package".to_string(),
                    "file".to_string(),
                ],
                vocabulary: MarkerVocabulary {
                    directory: vec!["folder".to_string(), "package".to_string()],
                    regular_file: vec!["file".to_string()],
                    ..Default::default()
                },
            },
            identity: Some(IdentityRule {
                pointer: "/eTag".to_string(),
                pattern: BRACED_UUID_PATTERN.to_string(),
            }),
            containment: ContainmentRule::NativeIdKeyed {
                id_pointer: "/id".to_string(),
                parent_pointer: "/parentReference/id".to_string(),
            },
        }
    }

    /// Dropbox `files/list_folder` entries. Dropbox has no parent ids; paths are
    /// case-insensitive.
    pub fn dropbox() -> Self {
        use TimestampKind::*;

        Self {
            name: "dropbox".to_string(),
            kind: ProviderKind::Dropbox,
            service_id: DROPBOX_SERVICE_ID,
            locator: vec![
                LocatorSource::Field {
                    pointer: "/path_display".to_string(),
                },
                LocatorSource::Field {
                    pointer: "/path_lower".to_string(),
                },
            ],
            label: Some("/name".to_string()),
            size: SizeRule {
                pointer: "/size".to_string(),
                directory_default: Some(0),
            },
            timestamps: vec![
                TimestampField::new("/client_modified", Modified, TimestampEncoding::Rfc3339),
                TimestampField::new("/server_modified", Changed, TimestampEncoding::Rfc3339),
            ],
            indicator: IndicatorRule::Marker {
                pointer: "/.tag".to_string(),
                vocabulary: MarkerVocabulary {
                    directory: vec!["folder".to_string()],
                    regular_file: vec!["file".to_string()],
                    ..Default::default()
                },
            },
            identity: None,
            containment: ContainmentRule::PathKeyed {
                style: PathStyle::CASE_INSENSITIVE_POSIX,
                parent_pointer: None,
            },
        }
    }

    /// Separator used to join a directory field with a name field.
    pub fn join_separator(&self) -> char {
        match &self.containment {
            ContainmentRule::PathKeyed { style, .. } => style.separator,
            ContainmentRule::NativeIdKeyed { .. } => '/',
        }
    }

    /// Check the profile is usable before any record is touched.
    pub fn validate(&self) -> Result<()> {
        if self.locator.is_empty() {
            return Err(self.invalid("at least one locator source is required"));
        }

        let mut pointers: Vec<&str> = vec![self.size.pointer.as_str()];
        pointers.extend(self.label.as_deref());
        for source in &self.locator {
            match source {
                LocatorSource::Field { pointer } | LocatorSource::Prefixed { pointer, .. } => {
                    pointers.push(pointer)
                }
                LocatorSource::Join { directory, name } => {
                    pointers.push(directory);
                    pointers.push(name);
                }
            }
        }
        pointers.extend(self.timestamps.iter().map(|t| t.pointer.as_str()));
        match &self.indicator {
            IndicatorRule::PosixMode { pointer }
            | IndicatorRule::WindowsAttributes { pointer }
            | IndicatorRule::Marker { pointer, .. } => pointers.push(pointer),
            IndicatorRule::Facet { facets, .. } if facets.is_empty() => {
                return Err(self.invalid("facet indicator needs at least one facet"));
            }
            IndicatorRule::Facet { .. } => {}
        }
        match &self.containment {
            ContainmentRule::PathKeyed { parent_pointer, .. } => {
                pointers.extend(parent_pointer.as_deref())
            }
            ContainmentRule::NativeIdKeyed {
                id_pointer,
                parent_pointer,
            } => {
                pointers.push(id_pointer);
                pointers.push(parent_pointer);
            }
        }
        if let Some(identity) = &self.identity {
            pointers.push(&identity.pointer);
            self.identity_regex()?;
        }

        if let Some(bad) = pointers.iter().find(|p| !p.starts_with('/')) {
            return Err(self.invalid(format!("`{bad}` is not a JSON pointer")));
        }
        Ok(())
    }

    pub(crate) fn identity_regex(&self) -> Result<Option<Regex>> {
        self.identity
            .as_ref()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map_err(|e| self.invalid(format!("identity pattern: {e}")))
            })
            .transpose()
    }

    fn invalid(&self, message: impl Into<String>) -> IngestError {
        IngestError::InvalidProfile {
            profile: self.name.clone(),
            message: message.into(),
        }
    }
}

fn local_locator() -> Vec<LocatorSource> {
    vec![
        LocatorSource::Field {
            pointer: "/path".to_string(),
        },
        LocatorSource::Join {
            directory: "/directory".to_string(),
            name: "/name".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_validate() {
        for profile in ProviderProfile::builtins() {
            profile
                .validate()
                .unwrap_or_else(|e| panic!("{}: {e}", profile.name));
        }
    }

    #[test]
    fn builtin_profiles_have_distinct_service_ids() {
        let ids: std::collections::HashSet<Uuid> = ProviderProfile::builtins()
            .iter()
            .map(|p| p.service_id)
            .collect();
        assert_eq!(ids.len(), ProviderKind::ALL.len());
    }

    #[test]
    fn rejects_bad_pointer_and_pattern() {
        let mut profile = ProviderProfile::posix();
        profile.size.pointer = "st_size".to_string();
        assert!(matches!(
            profile.validate(),
            Err(IngestError::InvalidProfile { .. })
        ));

        let mut profile = ProviderProfile::onedrive();
        profile.identity = Some(IdentityRule {
            pointer: "/eTag".to_string(),
            pattern: "([".to_string(),
        });
        assert!(matches!(
            profile.validate(),
            Err(IngestError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn profiles_round_trip_through_json() {
        let profile = ProviderProfile::onedrive();
        let json = serde_json::to_string(&profile).unwrap();
        let back: ProviderProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }
}
