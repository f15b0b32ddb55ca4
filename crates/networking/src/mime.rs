//! Media types as reported by servers.

use std::collections::BTreeMap;
use std::fmt;

/// A parsed media type such as `text/gemini; charset=utf-8`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MimeType {
    /// Top level type, lower-cased
    pub kind: String,
    /// Subtype, lower-cased
    pub subtype: String,
    /// Parameters with lower-cased names
    pub parameters: BTreeMap<String, String>,
}

impl MimeType {
    pub fn new(kind: &str, subtype: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Parse a media type. Parameters may be separated by `;` or by
    /// whitespace alone, as some servers send `text/plain charset=utf-8`.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = input
            .split(|c: char| c == ';' || c.is_whitespace())
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let essence = parts.next()?;
        let (kind, subtype) = essence.split_once('/')?;
        let valid = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+*".contains(c))
        };
        if !valid(kind) || !valid(subtype) {
            return None;
        }

        let mut mime = Self::new(kind, subtype);
        for param in parts {
            if let Some((name, value)) = param.split_once('=') {
                let value = value.trim().trim_matches('"');
                mime.parameters
                    .insert(name.trim().to_ascii_lowercase(), value.to_string());
            }
        }
        Some(mime)
    }

    pub fn parse_or_octet_stream(input: &str) -> Self {
        Self::parse(input).unwrap_or_else(Self::octet_stream)
    }

    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is(&self, kind: &str, subtype: &str) -> bool {
        self.kind == kind && self.subtype == subtype
    }

    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    /// Declared character set, upper-cased, defaulting to UTF-8
    pub fn charset(&self) -> String {
        self.parameter("charset").unwrap_or("utf-8").to_ascii_uppercase()
    }

    /// `type/subtype` without parameters
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, "; {}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_parameters() {
        let mime = MimeType::parse("text/gemini; charset=ISO-8859-1; lang=en").unwrap();
        assert!(mime.is("text", "gemini"));
        assert_eq!(mime.charset(), "ISO-8859-1");
        assert_eq!(mime.parameter("LANG"), Some("en"));
    }

    #[test]
    fn test_parse_whitespace_separated() {
        let mime = MimeType::parse("text/plain charset=utf-8").unwrap();
        assert!(mime.is_text());
        assert_eq!(mime.charset(), "UTF-8");
    }

    #[test]
    fn test_reject_garbage() {
        assert!(MimeType::parse("").is_none());
        assert!(MimeType::parse("nonsense").is_none());
        assert!(MimeType::parse("text/").is_none());
        assert_eq!(MimeType::parse_or_octet_stream("??"), MimeType::octet_stream());
    }

    #[test]
    fn test_display() {
        let mime = MimeType::new("Text", "HTML").with_parameter("charset", "utf-8");
        assert_eq!(mime.to_string(), "text/html; charset=utf-8");
        assert_eq!(mime.essence(), "text/html");
    }
}
