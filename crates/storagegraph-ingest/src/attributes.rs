//! Attribute / type mapping.
//!
//! Maps a provider-specific type indicator onto the closed [`TypeFlag`] vocabulary:
//!
//! - POSIX `st_mode` and Windows `FILE_ATTRIBUTE_*` bitmasks are tested against fixed tables
//!   of named bit patterns; every matching name is reported.
//! - Cloud providers expose a symbolic marker (a MIME type, a `.tag`, a facet name) that is
//!   compared against a [`MarkerVocabulary`].
//!
//! The mapping is total: unknown bits or markers never fail, they just classify as
//! [`TypeFlag::Other`].

use serde::{Deserialize, Serialize};
use storagegraph_model::{TypeFlag, TypeFlags};

// ============================================================================
// POSIX st_mode
// ============================================================================

pub const S_IFMT: u64 = 0o170000;
pub const S_IFSOCK: u64 = 0o140000;
pub const S_IFLNK: u64 = 0o120000;
pub const S_IFREG: u64 = 0o100000;
pub const S_IFBLK: u64 = 0o060000;
pub const S_IFDIR: u64 = 0o040000;
pub const S_IFCHR: u64 = 0o020000;
pub const S_IFIFO: u64 = 0o010000;

pub const S_ISUID: u64 = 0o4000;
pub const S_ISGID: u64 = 0o2000;
pub const S_ISVTX: u64 = 0o1000;

/// `mode & S_IFMT` is a field, so file types are matched by equality.
const POSIX_FILE_TYPES: &[(&str, u64, Option<TypeFlag>)] = &[
    ("S_IFSOCK", S_IFSOCK, None),
    ("S_IFLNK", S_IFLNK, Some(TypeFlag::Symlink)),
    ("S_IFREG", S_IFREG, Some(TypeFlag::RegularFile)),
    ("S_IFBLK", S_IFBLK, None),
    ("S_IFDIR", S_IFDIR, Some(TypeFlag::Directory)),
    ("S_IFCHR", S_IFCHR, None),
    ("S_IFIFO", S_IFIFO, None),
];

/// Independent mode bits, matched by membership.
const POSIX_MODE_BITS: &[(&str, u64)] = &[
    ("S_ISUID", S_ISUID),
    ("S_ISGID", S_ISGID),
    ("S_ISVTX", S_ISVTX),
];

// ============================================================================
// Windows FILE_ATTRIBUTE_*
// ============================================================================

pub const FILE_ATTRIBUTE_DIRECTORY: u64 = 0x10;
pub const FILE_ATTRIBUTE_DEVICE: u64 = 0x40;
pub const FILE_ATTRIBUTE_REPARSE_POINT: u64 = 0x400;

const WINDOWS_ATTRIBUTES: &[(&str, u64)] = &[
    ("FILE_ATTRIBUTE_READONLY", 0x1),
    ("FILE_ATTRIBUTE_HIDDEN", 0x2),
    ("FILE_ATTRIBUTE_SYSTEM", 0x4),
    ("FILE_ATTRIBUTE_DIRECTORY", FILE_ATTRIBUTE_DIRECTORY),
    ("FILE_ATTRIBUTE_ARCHIVE", 0x20),
    ("FILE_ATTRIBUTE_DEVICE", FILE_ATTRIBUTE_DEVICE),
    ("FILE_ATTRIBUTE_NORMAL", 0x80),
    ("FILE_ATTRIBUTE_TEMPORARY", 0x100),
    ("FILE_ATTRIBUTE_SPARSE_FILE", 0x200),
    ("FILE_ATTRIBUTE_REPARSE_POINT", FILE_ATTRIBUTE_REPARSE_POINT),
    ("FILE_ATTRIBUTE_COMPRESSED", 0x800),
    ("FILE_ATTRIBUTE_OFFLINE", 0x1000),
    ("FILE_ATTRIBUTE_NOT_CONTENT_INDEXED", 0x2000),
    ("FILE_ATTRIBUTE_ENCRYPTED", 0x4000),
    ("FILE_ATTRIBUTE_INTEGRITY_STREAM", 0x8000),
    ("FILE_ATTRIBUTE_VIRTUAL", 0x10000),
    ("FILE_ATTRIBUTE_NO_SCRUB_DATA", 0x20000),
    ("FILE_ATTRIBUTE_RECALL_ON_OPEN", 0x40000),
    ("FILE_ATTRIBUTE_PINNED", 0x80000),
    ("FILE_ATTRIBUTE_UNPINNED", 0x100000),
    ("FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS", 0x400000),
];

// ============================================================================
// Symbolic markers
// ============================================================================

/// Known marker values for one cloud provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerVocabulary {
    #[serde(default)]
    pub directory: Vec<String>,
    #[serde(default)]
    pub regular_file: Vec<String>,
    #[serde(default)]
    pub symlink: Vec<String>,
    /// Flag for a marker that is present but matches none of the lists.
    ///
    /// Google Drive only distinguishes folders and shortcuts; every other MIME type is a file.
    #[serde(default)]
    pub otherwise: Option<TypeFlag>,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl MarkerVocabulary {
    fn matches(&self, candidates: &[String], marker: &str) -> bool {
        candidates.iter().any(|known| {
            if self.case_insensitive {
                known.eq_ignore_ascii_case(marker)
            } else {
                known == marker
            }
        })
    }
}

/// A provider-specific type indicator, already extracted from the record.
#[derive(Debug, Clone, Copy)]
pub enum TypeIndicator<'a> {
    PosixMode(u64),
    WindowsAttributes(u64),
    Marker {
        value: Option<&'a str>,
        vocabulary: &'a MarkerVocabulary,
    },
    /// The record did not carry the indicator at all.
    Missing,
}

/// Result of mapping one indicator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeMapping {
    pub flags: TypeFlags,
    /// Names of every matching bit pattern / marker.
    pub attributes: Vec<String>,
}

impl TypeMapping {
    pub fn is_directory(&self) -> bool {
        self.flags.is_directory()
    }

    fn other(attributes: Vec<String>) -> Self {
        Self {
            flags: TypeFlags::only(TypeFlag::Other),
            attributes,
        }
    }
}

/// Classify one indicator. Total: never fails.
pub fn map_type(indicator: TypeIndicator<'_>) -> TypeMapping {
    match indicator {
        TypeIndicator::PosixMode(mode) => map_posix_mode(mode),
        TypeIndicator::WindowsAttributes(attributes) => map_windows_attributes(attributes),
        TypeIndicator::Marker {
            value: Some(marker),
            vocabulary,
        } => map_marker(marker, vocabulary),
        TypeIndicator::Marker { value: None, .. } | TypeIndicator::Missing => {
            TypeMapping::other(Vec::new())
        }
    }
}

pub fn map_posix_mode(mode: u64) -> TypeMapping {
    let mut attributes = Vec::new();
    let mut flags = TypeFlags::new();

    let file_type = mode & S_IFMT;
    for (name, pattern, flag) in POSIX_FILE_TYPES {
        if file_type == *pattern {
            attributes.push(name.to_string());
            if let Some(flag) = flag {
                flags.insert(*flag);
            }
        }
    }

    for (name, bit) in POSIX_MODE_BITS {
        if mode & bit == *bit {
            attributes.push(name.to_string());
        }
    }

    if flags.is_empty() {
        flags.insert(TypeFlag::Other);
    }
    TypeMapping { flags, attributes }
}

pub fn map_windows_attributes(value: u64) -> TypeMapping {
    let attributes: Vec<String> = WINDOWS_ATTRIBUTES
        .iter()
        .filter(|(_, bit)| value & bit == *bit)
        .map(|(name, _)| name.to_string())
        .collect();

    let mut flags = TypeFlags::new();
    if value & FILE_ATTRIBUTE_DIRECTORY != 0 {
        flags.insert(TypeFlag::Directory);
    }
    if value & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        flags.insert(TypeFlag::Symlink);
    }
    if value & FILE_ATTRIBUTE_DEVICE != 0 {
        flags.insert(TypeFlag::Other);
    }
    // Windows has no "regular file" bit; any named attribute without a type bit means one.
    if flags.is_empty() {
        flags.insert(if attributes.is_empty() {
            TypeFlag::Other
        } else {
            TypeFlag::RegularFile
        });
    }

    TypeMapping { flags, attributes }
}

pub fn map_marker(marker: &str, vocabulary: &MarkerVocabulary) -> TypeMapping {
    let mut flags = TypeFlags::new();
    if vocabulary.matches(&vocabulary.directory, marker) {
        flags.insert(TypeFlag::Directory);
    }
    if vocabulary.matches(&vocabulary.regular_file, marker) {
        flags.insert(TypeFlag::RegularFile);
    }
    if vocabulary.matches(&vocabulary.symlink, marker) {
        flags.insert(TypeFlag::Symlink);
    }

    if flags.is_empty() {
        return match vocabulary.otherwise {
            Some(flag) => TypeMapping {
                flags: TypeFlags::only(flag),
                attributes: vec![marker.to_string()],
            },
            None => TypeMapping::other(Vec::new()),
        };
    }

    TypeMapping {
        flags,
        attributes: vec![marker.to_string()],
    }
}
