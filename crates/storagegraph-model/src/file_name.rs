//! Structured run file names.
//!
//! An Objects file and its Relationships file share every field except `kind`, which is how
//! the bulk loader pairs them. Later tooling recovers run metadata by decoding the name:
//!
//! ```text
//! <prefix>-plt=<platform>-svc=<ingester>-machine=<machine>[-storage=<storage>]-ts=<ts>-kind=<kind>.jsonl
//! ```
//!
//! Values are percent-encoded (everything but ASCII alphanumerics, `_` and `~`), so `-`, `=`
//! and `.` never appear unescaped inside a value. The timestamp is written as
//! `YYYYMMDDTHHMMSS_<9 digit nanos>Z`, which is exact to the nanosecond. Only years 0000..=9999
//! without a leap second fit that shape; other instants are refused by [`RunFileName::encode`].

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FILE_PREFIX: &str = "storagegraph";
pub const RUN_FILE_SUFFIX: &str = "jsonl";

const FIELD_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'~');
const SEGMENT_SEPARATOR: char = '-';
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Objects,
    Relationships,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Objects => "objects",
            StreamKind::Relationships => "relationships",
        }
    }

    pub fn paired(&self) -> StreamKind {
        match self {
            StreamKind::Objects => StreamKind::Relationships,
            StreamKind::Relationships => StreamKind::Objects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileNameError {
    #[error("file name must end with `.jsonl`")]
    MissingSuffix,
    #[error("missing `{0}` segment")]
    MissingSegment(&'static str),
    #[error("expected `{expected}` segment, found `{found}`")]
    UnexpectedSegment { expected: &'static str, found: String },
    #[error("unexpected trailing segment `{0}`")]
    TrailingSegment(String),
    #[error("value of `{key}` is not valid percent-encoded UTF-8")]
    BadEncoding { key: &'static str },
    #[error("bad timestamp `{0}`")]
    BadTimestamp(String),
    #[error("timestamp {0} cannot be written into a file name")]
    UnsupportedTimestamp(DateTime<Utc>),
    #[error("unknown stream kind `{0}`")]
    UnknownKind(String),
}

/// Run metadata carried by an output file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFileName {
    pub prefix: String,
    pub platform: String,
    pub ingester: String,
    pub machine: String,
    pub storage: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub kind: StreamKind,
}

impl RunFileName {
    pub fn new(
        platform: impl Into<String>,
        ingester: impl Into<String>,
        machine: impl Into<String>,
        storage: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            prefix: DEFAULT_FILE_PREFIX.to_string(),
            platform: platform.into(),
            ingester: ingester.into(),
            machine: machine.into(),
            storage,
            timestamp,
            kind: StreamKind::Objects,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_kind(&self, kind: StreamKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Name of the other stream of the same run.
    pub fn paired(&self) -> Self {
        self.with_kind(self.kind.paired())
    }

    pub fn encode(&self) -> Result<String, FileNameError> {
        let timestamp = encode_timestamp(&self.timestamp)?;
        let mut out = escape(&self.prefix);
        push_segment(&mut out, "plt", &escape(&self.platform));
        push_segment(&mut out, "svc", &escape(&self.ingester));
        push_segment(&mut out, "machine", &escape(&self.machine));
        if let Some(storage) = &self.storage {
            push_segment(&mut out, "storage", &escape(storage));
        }
        push_segment(&mut out, "ts", &timestamp);
        push_segment(&mut out, "kind", self.kind.as_str());
        out.push('.');
        out.push_str(RUN_FILE_SUFFIX);
        Ok(out)
    }

    pub fn decode(name: &str) -> Result<Self, FileNameError> {
        let stem = name
            .strip_suffix(RUN_FILE_SUFFIX)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or(FileNameError::MissingSuffix)?;

        let mut segments = stem.split(SEGMENT_SEPARATOR).peekable();
        let prefix = segments
            .next()
            .ok_or(FileNameError::MissingSegment("prefix"))?;
        let prefix = unescape("prefix", prefix)?;

        let platform = unescape("plt", expect_segment(&mut segments, "plt")?)?;
        let ingester = unescape("svc", expect_segment(&mut segments, "svc")?)?;
        let machine = unescape("machine", expect_segment(&mut segments, "machine")?)?;

        let storage = match segments.peek() {
            Some(segment) if segment.starts_with("storage=") => {
                let value = expect_segment(&mut segments, "storage")?;
                Some(unescape("storage", value)?)
            }
            _ => None,
        };

        let timestamp = decode_timestamp(expect_segment(&mut segments, "ts")?)?;
        let kind = match expect_segment(&mut segments, "kind")? {
            "objects" => StreamKind::Objects,
            "relationships" => StreamKind::Relationships,
            other => return Err(FileNameError::UnknownKind(other.to_string())),
        };

        if let Some(extra) = segments.next() {
            return Err(FileNameError::TrailingSegment(extra.to_string()));
        }

        Ok(Self {
            prefix,
            platform,
            ingester,
            machine,
            storage,
            timestamp,
            kind,
        })
    }
}

fn escape(value: &str) -> String {
    utf8_percent_encode(value, FIELD_ESCAPES).to_string()
}

fn unescape(key: &'static str, value: &str) -> Result<String, FileNameError> {
    percent_decode_str(value)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| FileNameError::BadEncoding { key })
}

fn push_segment(out: &mut String, key: &str, value: &str) {
    out.push(SEGMENT_SEPARATOR);
    out.push_str(key);
    out.push('=');
    out.push_str(value);
}

fn expect_segment<'a, I>(segments: &mut I, key: &'static str) -> Result<&'a str, FileNameError>
where
    I: Iterator<Item = &'a str>,
{
    let segment = segments.next().ok_or(FileNameError::MissingSegment(key))?;
    match segment.split_once('=') {
        Some((found, value)) if found == key => Ok(value),
        _ => Err(FileNameError::UnexpectedSegment {
            expected: key,
            found: segment.to_string(),
        }),
    }
}

fn encode_timestamp(ts: &DateTime<Utc>) -> Result<String, FileNameError> {
    let nanos = ts.timestamp_subsec_nanos();
    if !(0..=9999).contains(&ts.year()) || nanos >= 1_000_000_000 {
        return Err(FileNameError::UnsupportedTimestamp(*ts));
    }
    Ok(format!("{}_{nanos:09}Z", ts.format(TIMESTAMP_FORMAT)))
}

fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, FileNameError> {
    let bad = || FileNameError::BadTimestamp(value.to_string());

    let body = value.strip_suffix('Z').ok_or_else(bad)?;
    let (seconds, nanos) = body.split_once('_').ok_or_else(bad)?;
    if nanos.len() != 9 || !nanos.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let nanos: u32 = nanos.parse().map_err(|_| bad())?;

    let naive = NaiveDateTime::parse_from_str(seconds, TIMESTAMP_FORMAT).map_err(|_| bad())?;
    let naive = naive.with_nanosecond(nanos).ok_or_else(bad)?;
    Ok(naive.and_utc())
}
