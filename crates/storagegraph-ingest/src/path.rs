//! Path normalization for path-keyed containment.
//!
//! Keys in the path → identifier map and parent paths computed from locators must agree
//! byte for byte, so both go through [`PathStyle::normalize`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStyle {
    /// Native separator. `\` styles also accept `/`.
    pub separator: char,
    pub case_insensitive: bool,
}

impl PathStyle {
    pub const POSIX: PathStyle = PathStyle {
        separator: '/',
        case_insensitive: false,
    };

    pub const WINDOWS: PathStyle = PathStyle {
        separator: '\\',
        case_insensitive: true,
    };

    /// Dropbox paths are `/`-separated and case-insensitive.
    pub const CASE_INSENSITIVE_POSIX: PathStyle = PathStyle {
        separator: '/',
        case_insensitive: true,
    };

    /// Lookup key for `raw`.
    pub fn normalize(&self, raw: &str) -> String {
        let (absolute, components) = self.components(raw);
        let joined = join(absolute, &components);
        if self.case_insensitive {
            joined.to_lowercase()
        } else {
            joined
        }
    }

    /// Immediate parent of `raw`, case preserved; `None` for a root or a bare name.
    pub fn parent(&self, raw: &str) -> Option<String> {
        let (absolute, components) = self.components(raw);
        match components.len() {
            0 => None,
            1 if absolute => Some("/".to_string()),
            1 => None,
            n => Some(join(absolute, &components[..n - 1])),
        }
    }

    /// Last component of `raw`.
    pub fn file_name<'a>(&self, raw: &'a str) -> Option<&'a str> {
        raw.rsplit(|c: char| c == '/' || c == self.separator)
            .find(|component| !component.is_empty())
    }

    fn components<'a>(&self, raw: &'a str) -> (bool, Vec<&'a str>) {
        let is_separator = |c: char| c == '/' || c == self.separator;
        let absolute = raw.starts_with(is_separator);
        let components = raw
            .split(is_separator)
            .filter(|component| !component.is_empty() && *component != ".")
            .collect();
        (absolute, components)
    }
}

fn join(absolute: bool, components: &[&str]) -> String {
    let body = components.join("/");
    if absolute {
        format!("/{body}")
    } else {
        body
    }
}
