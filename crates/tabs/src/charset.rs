use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CharsetError {
    #[error("Unsupported character set: {0}")]
    Unsupported(String),

    #[error("Input is not valid {charset} at byte {offset}")]
    InvalidInput { charset: String, offset: usize },
}

/// Transcodes document bodies to UTF-8
pub trait CharsetConverter: Send + Sync {
    fn to_utf8(&self, input: &[u8], charset: &str) -> Result<Vec<u8>, CharsetError>;
}

/// Handles the single-byte charsets that map directly onto Unicode code points
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinConverter;

impl CharsetConverter for BuiltinConverter {
    fn to_utf8(&self, input: &[u8], charset: &str) -> Result<Vec<u8>, CharsetError> {
        match charset.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => match std::str::from_utf8(input) {
                Ok(_) => Ok(input.to_vec()),
                Err(e) => Err(CharsetError::InvalidInput {
                    charset: "UTF-8".into(),
                    offset: e.valid_up_to(),
                }),
            },
            "US-ASCII" | "ASCII" => match input.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(CharsetError::InvalidInput {
                    charset: "US-ASCII".into(),
                    offset,
                }),
                None => Ok(input.to_vec()),
            },
            "ISO-8859-1" | "ISO8859-1" | "LATIN1" | "LATIN-1" => {
                Ok(input.iter().map(|&b| b as char).collect::<String>().into_bytes())
            }
            other => Err(CharsetError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1() {
        let converted = BuiltinConverter.to_utf8(b"caf\xe9", "iso-8859-1").unwrap();
        assert_eq!(String::from_utf8(converted).unwrap(), "café");
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        assert_eq!(BuiltinConverter.to_utf8(b"plain", "us-ascii").unwrap(), b"plain");
        assert_eq!(
            BuiltinConverter.to_utf8(b"ab\x80", "US-ASCII"),
            Err(CharsetError::InvalidInput { charset: "US-ASCII".into(), offset: 2 })
        );
    }

    #[test]
    fn test_unknown_charset() {
        assert!(matches!(
            BuiltinConverter.to_utf8(b"x", "shift_jis"),
            Err(CharsetError::Unsupported(_))
        ));
    }
}
