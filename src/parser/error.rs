//! Errors raised while decoding the binary format.
//!
//! Every variant records the byte offset (from the start of the module) at
//! which decoding stopped. A decode error always rejects the whole module.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed module at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("malformed UTF-8 encoding at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("invalid module header at offset {offset}: {reason}")]
    InvalidHeader { offset: usize, reason: &'static str },

    #[error("unexpected section {id} at offset {offset}: out of order or duplicated")]
    InvalidSectionOrder { offset: usize, id: u8 },

    #[error("section {id} size mismatch at offset {offset}")]
    SectionSizeMismatch { offset: usize, id: u8 },

    #[error("illegal opcode {opcode:#x} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u32 },

    #[error("too many {what} at offset {offset} (limit {limit})")]
    LimitExceeded {
        offset: usize,
        what: &'static str,
        limit: u32,
    },
}

impl DecodeError {
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    /// Byte offset at which decoding failed.
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::Malformed { offset, .. }
            | DecodeError::UnexpectedEof { offset }
            | DecodeError::InvalidUtf8 { offset }
            | DecodeError::InvalidHeader { offset, .. }
            | DecodeError::InvalidSectionOrder { offset, .. }
            | DecodeError::SectionSizeMismatch { offset, .. }
            | DecodeError::UnknownOpcode { offset, .. }
            | DecodeError::LimitExceeded { offset, .. } => *offset,
        }
    }
}
