// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failure to turn a wire payload back into a typed value.
///
/// Every variant is recoverable: the receiving side logs the error and drops
/// the payload instead of propagating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is not valid JSON, or not a JSON object.
    InvalidJson(String),
    /// The object has no string `name` discriminator.
    MissingName,
    /// The `name` discriminator is not one this build knows about.
    UnknownName(String),
    /// The discriminator resolved, but the variant's fields are absent,
    /// mistyped or out of range.
    InvalidFields { name: String, reason: String },
    /// The payload cannot be decoded at the envelope's protocol version.
    VersionMismatch { version: u32 },
    /// The envelope `kind` is not an inbound command.
    UnknownKind(u32),
}

impl DecodeError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "INVALID_JSON",
            Self::MissingName => "MISSING_NAME",
            Self::UnknownName(_) => "UNKNOWN_NAME",
            Self::InvalidFields { .. } => "INVALID_FIELDS",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
            Self::UnknownKind(_) => "UNKNOWN_KIND",
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(reason) => write!(f, "malformed message: {reason}"),
            Self::MissingName => f.write_str("malformed message: missing name discriminator"),
            Self::UnknownName(name) => write!(f, "malformed message: unknown name {name:?}"),
            Self::InvalidFields { name, reason } => {
                write!(f, "malformed message: bad fields for {name}: {reason}")
            }
            Self::VersionMismatch { version } => {
                write!(f, "malformed message: not decodable at protocol version {version}")
            }
            Self::UnknownKind(kind) => write!(f, "unrecognized command kind {kind}"),
        }
    }
}

impl std::error::Error for DecodeError {}
