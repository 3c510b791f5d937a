//! Canonical object builder.
//!
//! Turns one provider-native record into a [`StorageObject`] by following the profile's field
//! pointers. Alongside the object it returns the two things the containment pass needs later:
//! the record's native id (if the profile keys containment by id) and its raw parent hint.

use crate::attributes::{map_type, TypeIndicator, TypeMapping};
use crate::error::{IngestError, RequiredField, Result};
use crate::path::PathStyle;
use crate::profile::{
    ContainmentRule, IndicatorRule, LocatorSource, ProviderProfile, TimestampEncoding,
    TimestampField,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use storagegraph_model::{ObjectId, Provenance, RawMetadata, StorageObject, Timestamp};
use uuid::Uuid;

/// The raw parent reference carried by a record, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentHint {
    None,
    Path(String),
    /// Several ids are legal (Google Drive `parents`); the first resolving one wins.
    NativeIds(Vec<String>),
}

impl std::fmt::Display for ParentHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParentHint::None => f.write_str("<none>"),
            ParentHint::Path(path) => write!(f, "path `{path}`"),
            ParentHint::NativeIds(ids) => write!(f, "ids [{}]", ids.join(", ")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuiltObject {
    pub object: StorageObject,
    pub native_id: Option<String>,
    pub parent_hint: ParentHint,
    /// Whether the id came from the record rather than being freshly generated.
    pub recovered_id: bool,
    /// Timestamp fields present in the record whose values could not be parsed.
    pub dropped_timestamps: usize,
}

pub struct ObjectBuilder<'p> {
    profile: &'p ProviderProfile,
    provenance: Provenance,
    collected_at: DateTime<Utc>,
    identity: Option<Regex>,
}

impl<'p> ObjectBuilder<'p> {
    pub fn new(
        profile: &'p ProviderProfile,
        provenance: Provenance,
        collected_at: DateTime<Utc>,
    ) -> Result<Self> {
        profile.validate()?;
        Ok(Self {
            identity: profile.identity_regex()?,
            profile,
            provenance,
            collected_at,
        })
    }

    pub fn build(&self, record: Value) -> Result<BuiltObject> {
        if !record.is_object() {
            return Err(IngestError::missing(
                RequiredField::Record,
                format!("expected a key/value record, got {}", json_kind(&record)),
            ));
        }

        let mapping = map_type(self.indicator(&record));
        let locator = self.locator(&record)?;
        let size = self.size(&record, &mapping)?;
        let label = self.label(&record, &locator);
        let (timestamps, dropped_timestamps) = self.timestamps(&record);
        let (id, recovered_id) = match self.recover_id(&record) {
            Some(id) => (id, true),
            None => (ObjectId::new_random(), false),
        };
        let (native_id, parent_hint) = self.containment_keys(&record, &locator);

        tracing::debug!(
            id = %id,
            locator = %locator,
            size,
            directory = mapping.is_directory(),
            "built object"
        );

        let TypeMapping { flags, attributes } = mapping;
        let object = StorageObject {
            id,
            locator,
            label,
            size,
            timestamps,
            type_flags: flags,
            attributes,
            provenance: self.provenance.clone(),
            raw: RawMetadata::new(self.profile.kind, self.collected_at, record),
        };

        Ok(BuiltObject {
            object,
            native_id,
            parent_hint,
            recovered_id,
            dropped_timestamps,
        })
    }

    fn indicator<'a>(&'a self, record: &'a Value) -> TypeIndicator<'a> {
        match &self.profile.indicator {
            IndicatorRule::PosixMode { pointer } => lookup_u64(record, pointer)
                .map(TypeIndicator::PosixMode)
                .unwrap_or(TypeIndicator::Missing),
            IndicatorRule::WindowsAttributes { pointer } => lookup_u64(record, pointer)
                .map(TypeIndicator::WindowsAttributes)
                .unwrap_or(TypeIndicator::Missing),
            IndicatorRule::Marker {
                pointer,
                vocabulary,
            } => TypeIndicator::Marker {
                value: lookup_str(record, pointer),
                vocabulary,
            },
            IndicatorRule::Facet { facets, vocabulary } => TypeIndicator::Marker {
                value: facets
                    .iter()
                    .find(|facet| record.get(facet.as_str()).is_some_and(|v| !v.is_null()))
                    .map(String::as_str),
                vocabulary,
            },
        }
    }

    fn locator(&self, record: &Value) -> Result<String> {
        let separator = self.profile.join_separator();
        self.profile
            .locator
            .iter()
            .find_map(|source| match source {
                LocatorSource::Field { pointer } => lookup_str(record, pointer).map(str::to_string),
                LocatorSource::Join { directory, name } => {
                    let directory = lookup_str(record, directory)?;
                    let name = lookup_str(record, name)?;
                    Some(join_locator(directory, name, separator))
                }
                LocatorSource::Prefixed { prefix, pointer } => {
                    lookup_str(record, pointer).map(|value| format!("{prefix}{value}"))
                }
            })
            .ok_or_else(|| {
                IngestError::missing(RequiredField::Locator, "no locator source present")
            })
    }

    fn size(&self, record: &Value, mapping: &TypeMapping) -> Result<u64> {
        let rule = &self.profile.size;
        match record.pointer(&rule.pointer) {
            Some(Value::Null) | None => match rule.directory_default {
                Some(default) if mapping.is_directory() => Ok(default),
                _ => Err(IngestError::missing(
                    RequiredField::Size,
                    format!("`{}` is absent", rule.pointer),
                )),
            },
            Some(value) => parse_size(value).ok_or_else(|| {
                IngestError::missing(
                    RequiredField::Size,
                    format!("`{}` is not a non-negative integer: {value}", rule.pointer),
                )
            }),
        }
    }

    fn label(&self, record: &Value, locator: &str) -> String {
        self.profile
            .label
            .as_deref()
            .and_then(|pointer| lookup_str(record, pointer))
            .or_else(|| self.path_style().file_name(locator))
            .unwrap_or(locator)
            .to_string()
    }

    /// Locator separators; id-keyed providers use URL-like `/` locators.
    fn path_style(&self) -> PathStyle {
        match &self.profile.containment {
            ContainmentRule::PathKeyed { style, .. } => *style,
            ContainmentRule::NativeIdKeyed { .. } => PathStyle::POSIX,
        }
    }

    fn timestamps(&self, record: &Value) -> (Vec<Timestamp>, usize) {
        let mut timestamps: Vec<Timestamp> = Vec::new();
        let mut dropped = 0;
        for field in &self.profile.timestamps {
            if timestamps.iter().any(|t| t.kind == field.kind) {
                continue;
            }
            let Some(value) = record.pointer(&field.pointer).filter(|v| !v.is_null()) else {
                continue;
            };
            match parse_timestamp(value, field.encoding) {
                Some(instant) => timestamps.push(Timestamp {
                    kind: field.kind,
                    value: instant,
                    description: describe(field),
                }),
                None => {
                    tracing::warn!(
                        field = %field.pointer,
                        value = %value,
                        "ignoring unparseable timestamp"
                    );
                    dropped += 1;
                }
            }
        }
        (timestamps, dropped)
    }

    fn recover_id(&self, record: &Value) -> Option<ObjectId> {
        let (rule, regex) = self.profile.identity.as_ref().zip(self.identity.as_ref())?;
        let source = lookup_str(record, &rule.pointer)?;
        let captures = regex.captures(source)?;
        let matched = captures.get(1).or_else(|| captures.get(0))?.as_str();
        let trimmed = matched.trim_start_matches('{').trim_end_matches('}');
        match Uuid::parse_str(trimmed) {
            Ok(uuid) if !uuid.is_nil() => Some(ObjectId::from_uuid(uuid)),
            _ => {
                tracing::debug!(field = %rule.pointer, "identity pattern matched a non-UUID");
                None
            }
        }
    }

    fn containment_keys(&self, record: &Value, locator: &str) -> (Option<String>, ParentHint) {
        match &self.profile.containment {
            ContainmentRule::PathKeyed {
                style,
                parent_pointer,
            } => {
                let explicit = parent_pointer
                    .as_deref()
                    .and_then(|pointer| lookup_str(record, pointer))
                    .map(str::to_string);
                let hint = explicit
                    .or_else(|| style.parent(locator))
                    .map(ParentHint::Path)
                    .unwrap_or(ParentHint::None);
                (None, hint)
            }
            ContainmentRule::NativeIdKeyed {
                id_pointer,
                parent_pointer,
            } => {
                let native_id = record.pointer(id_pointer).and_then(native_id_string);
                let hint = match record.pointer(parent_pointer) {
                    Some(Value::Array(items)) => {
                        ParentHint::NativeIds(items.iter().filter_map(native_id_string).collect())
                    }
                    Some(value) => native_id_string(value)
                        .map(|id| ParentHint::NativeIds(vec![id]))
                        .unwrap_or(ParentHint::None),
                    None => ParentHint::None,
                };
                (native_id, hint)
            }
        }
    }
}

fn lookup_str<'a>(record: &'a Value, pointer: &str) -> Option<&'a str> {
    record
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn lookup_u64(record: &Value, pointer: &str) -> Option<u64> {
    record.pointer(pointer).and_then(parse_size)
}

fn native_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-negative integer, given as a number or a numeric string.
fn parse_size(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn join_locator(directory: &str, name: &str, separator: char) -> String {
    if directory.ends_with(separator) || directory.ends_with('/') {
        format!("{directory}{name}")
    } else {
        format!("{directory}{separator}{name}")
    }
}

fn parse_timestamp(value: &Value, encoding: TimestampEncoding) -> Option<DateTime<Utc>> {
    match encoding {
        TimestampEncoding::Rfc3339 => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        TimestampEncoding::EpochSeconds => {
            let seconds = match value {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            if !seconds.is_finite() {
                return None;
            }
            let whole = seconds.floor();
            let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(whole as i64, nanos)
        }
        TimestampEncoding::EpochNanos => {
            let nanos = match value {
                Value::Number(n) => n.as_i64()?,
                Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            DateTime::from_timestamp(
                nanos.div_euclid(1_000_000_000),
                nanos.rem_euclid(1_000_000_000) as u32,
            )
        }
    }
}

fn describe(field: &TimestampField) -> String {
    field.pointer.trim_start_matches('/').replace('/', ".")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
