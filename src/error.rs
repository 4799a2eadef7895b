//! Error types for the proxyDHCP responder.

use thiserror::Error;

/// Errors raised while decoding a DHCP packet.
///
/// Any of these means the packet is malformed; it is logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("invalid option {code} at offset {offset}: {message}")]
    InvalidOption {
        offset: usize,
        code: u8,
        message: String,
    },

    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

/// Errors raised while encoding a DHCP packet.
///
/// Nothing must be sent when serialization fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("malformed hardware address '{0}': need exactly 6 octets")]
    InvalidHardwareAddress(String),

    #[error("{field} field too long ({max} bytes max): {actual} bytes")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("option {code} too long: {len} bytes does not fit a one-byte length")]
    OptionTooLong { code: u8, len: usize },

    #[error("option {0} needs at least one address")]
    EmptyAddressList(u8),

    #[error("option {code}: sub-option code {sub_code} is reserved for pad/end")]
    ReservedSubOption { code: u8, sub_code: u8 },
}

/// Failures reported by the external collaborators (lookup, task, node store).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Everything that can stop a single packet from being answered.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("malformed packet: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to build reply: {0}")]
    Encode(#[from] EncodeError),

    #[error("collaborator failure: {0}")]
    Service(#[from] ServiceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::PacketTooShort {
            expected: 240,
            actual: 100,
        };
        assert_eq!(
            err.to_string(),
            "packet too short: expected at least 240 bytes, got 100"
        );
    }

    #[test]
    fn test_encode_error_display() {
        let err = EncodeError::FieldTooLong {
            field: "fname",
            max: 128,
            actual: 129,
        };
        assert_eq!(err.to_string(), "fname field too long (128 bytes max): 129 bytes");

        let err = EncodeError::InvalidHardwareAddress("12:3".to_string());
        assert!(err.to_string().contains("12:3"));
    }

    #[test]
    fn test_service_error_not_found() {
        assert!(ServiceError::NotFound("aa:bb".to_string()).is_not_found());
        assert!(!ServiceError::Unavailable("down".to_string()).is_not_found());
    }

    #[test]
    fn test_handler_error_from() {
        let err: HandlerError = ParseError::PacketTooShort {
            expected: 240,
            actual: 0,
        }
        .into();
        assert!(matches!(err, HandlerError::Parse(_)));
        assert!(err.to_string().starts_with("malformed packet"));
    }
}
