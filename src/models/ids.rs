use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of hex digits in a ledger identifier (32 bytes).
const MAX_HEX_DIGITS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier is not hex: {0}")]
    NotHex(String),

    #[error("identifier longer than 32 bytes: {0}")]
    TooLong(String),
}

/// Normalize to `0x` + 64 lowercase hex digits, the canonical ledger form.
fn normalize_hex(raw: &str) -> Result<String, IdError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(IdError::Empty);
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IdError::NotHex(raw.to_string()));
    }
    if digits.len() > MAX_HEX_DIGITS {
        return Err(IdError::TooLong(raw.to_string()));
    }
    Ok(format!("0x{:0>64}", digits.to_ascii_lowercase()))
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Build from a counter, zero-padded to the full 32-byte width.
            pub fn from_u128(value: u128) -> Self {
                Self(format!("0x{:064x}", value))
            }

            /// Abbreviated form for display, e.g. `0x1a2b3c…9f8e`.
            pub fn short(&self) -> String {
                let digits = &self.0[2..];
                format!("0x{}…{}", &digits[..6], &digits[digits.len() - 4..])
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                normalize_hex(s).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

hex_id!(
    /// Ledger-assigned identifier of a persisted object.
    ObjectId
);

hex_id!(
    /// Account address of an actor that originates transactions.
    Address
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_prefix_case_and_width() {
        let id: ObjectId = "ABCdef".parse().unwrap();
        assert_eq!(id.as_str().len(), 66);
        assert!(id.as_str().starts_with("0x0000"));
        assert!(id.as_str().ends_with("abcdef"));

        let short: ObjectId = "0XFF".parse().unwrap();
        let padded: ObjectId = format!("0x{:0>64}", "ff").parse().unwrap();
        assert_eq!(short, padded);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<ObjectId>(), Err(IdError::Empty));
        assert_eq!("0x".parse::<ObjectId>(), Err(IdError::Empty));
        assert!(matches!("0xzz".parse::<Address>(), Err(IdError::NotHex(_))));

        let long = format!("0x{}", "a".repeat(65));
        assert!(matches!(long.parse::<ObjectId>(), Err(IdError::TooLong(_))));
    }

    #[test]
    fn serde_goes_through_validation() {
        let id: ObjectId = serde_json::from_str("\"0xAA\"").unwrap();
        assert_eq!(id, ObjectId::from_u128(0xaa));
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            format!("\"0x{:0>64}\"", "aa")
        );
        assert!(serde_json::from_str::<ObjectId>("\"not hex\"").is_err());
    }

    #[test]
    fn short_form_keeps_ends() {
        let id = ObjectId::from_u128(0x1234);
        assert_eq!(id.as_str().len(), 66);
        assert_eq!(id.short(), "0x000000…1234");
    }
}
