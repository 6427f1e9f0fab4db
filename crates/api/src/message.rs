// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status and event notifications sent by the agent to its subscribers.
//!
//! A [`Status`] describes what the agent is doing and stays current until the
//! next one supersedes it. An [`Event`] is a transient occurrence inside the
//! current status. Both serialize to a flat JSON object whose `name` field is
//! the discriminator; `description` is informational and ignored on decode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// A file the agent is about to download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    #[serde(rename = "contentHash")]
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Downloading {
        artifacts: Vec<Artifact>,
    },
    Updating,
    CancellingUpdate,
    WaitingDownloadAuthorization,
    WaitingUpdateAuthorization,
    Idle,
    ConfigurationError {
        #[serde(default)]
        details: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Polling,
    StartDownloadFile {
        #[serde(rename = "fileName")]
        file_name: String,
    },
    DownloadProgress {
        #[serde(rename = "fileName")]
        file_name: String,
        #[serde(default)]
        percentage: f64,
    },
    FileDownloaded {
        #[serde(rename = "fileDownloaded")]
        file_downloaded: String,
    },
    AllFilesDownloaded,
    UpdateProgress {
        #[serde(rename = "phaseName")]
        phase_name: String,
        #[serde(rename = "phaseDescription", default)]
        phase_description: String,
        #[serde(default)]
        percentage: f64,
    },
    UpdateFinished {
        #[serde(rename = "successApply")]
        success_apply: bool,
        #[serde(default)]
        details: Vec<String>,
    },
    Error {
        #[serde(default)]
        details: Vec<String>,
    },
    UpdateAvailable {
        id: String,
    },
}

/// Wire discriminator of every message variant.
///
/// Append-only: renaming or removing a name breaks every deployed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageName {
    Downloading,
    Error,
    Updating,
    CancellingUpdate,
    WaitingDownloadAuthorization,
    WaitingUpdateAuthorization,
    Idle,
    StartDownloadFile,
    DownloadProgress,
    UpdateProgress,
    FileDownloaded,
    UpdateFinished,
    Polling,
    AllFilesDownloaded,
    UpdateAvailable,
    ConfigurationError,
}

impl MessageName {
    pub const ALL: [MessageName; 16] = [
        Self::Downloading,
        Self::Error,
        Self::Updating,
        Self::CancellingUpdate,
        Self::WaitingDownloadAuthorization,
        Self::WaitingUpdateAuthorization,
        Self::Idle,
        Self::StartDownloadFile,
        Self::DownloadProgress,
        Self::UpdateProgress,
        Self::FileDownloaded,
        Self::UpdateFinished,
        Self::Polling,
        Self::AllFilesDownloaded,
        Self::UpdateAvailable,
        Self::ConfigurationError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "DOWNLOADING",
            Self::Error => "ERROR",
            Self::Updating => "UPDATING",
            Self::CancellingUpdate => "CANCELLING_UPDATE",
            Self::WaitingDownloadAuthorization => "WAITING_DOWNLOAD_AUTHORIZATION",
            Self::WaitingUpdateAuthorization => "WAITING_UPDATE_AUTHORIZATION",
            Self::Idle => "IDLE",
            Self::StartDownloadFile => "START_DOWNLOAD_FILE",
            Self::DownloadProgress => "DOWNLOAD_PROGRESS",
            Self::UpdateProgress => "UPDATE_PROGRESS",
            Self::FileDownloaded => "FILE_DOWNLOADED",
            Self::UpdateFinished => "UPDATE_FINISHED",
            Self::Polling => "POLLING",
            Self::AllFilesDownloaded => "ALL_FILES_DOWNLOADED",
            Self::UpdateAvailable => "UPDATE_AVAILABLE",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// True when the name belongs to the [`Status`] branch.
    pub fn is_status(&self) -> bool {
        matches!(
            self,
            Self::Downloading
                | Self::Updating
                | Self::CancellingUpdate
                | Self::WaitingDownloadAuthorization
                | Self::WaitingUpdateAuthorization
                | Self::Idle
                | Self::ConfigurationError
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Downloading => "Client is downloading artifacts from server",
            Self::Updating => {
                "The update process is started. Any request to cancel an update will be rejected"
            }
            Self::CancellingUpdate => "Last update request is being cancelled",
            Self::WaitingDownloadAuthorization => "Waiting authorization to start download",
            Self::WaitingUpdateAuthorization => "Waiting authorization to start update",
            Self::Idle => "Client is waiting for new requests from server",
            Self::ConfigurationError => "Bad service configuration",
            Self::Polling => "Client is contacting server to retrieve new action to execute",
            Self::StartDownloadFile => "A file downloading is started",
            Self::FileDownloaded => "A file is downloaded",
            Self::DownloadProgress => "Percent of file downloaded",
            Self::AllFilesDownloaded => "All file needed are downloaded",
            Self::UpdateFinished => "The update is finished",
            Self::Error => "An error is occurred",
            Self::UpdateProgress => "Phase of update",
            Self::UpdateAvailable => "An update is available on cloud",
        }
    }
}

impl fmt::Display for MessageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageName {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownName(s.to_owned()))
    }
}

impl Status {
    pub fn name(&self) -> MessageName {
        match self {
            Self::Downloading { .. } => MessageName::Downloading,
            Self::Updating => MessageName::Updating,
            Self::CancellingUpdate => MessageName::CancellingUpdate,
            Self::WaitingDownloadAuthorization => MessageName::WaitingDownloadAuthorization,
            Self::WaitingUpdateAuthorization => MessageName::WaitingUpdateAuthorization,
            Self::Idle => MessageName::Idle,
            Self::ConfigurationError { .. } => MessageName::ConfigurationError,
        }
    }
}

impl Event {
    pub fn name(&self) -> MessageName {
        match self {
            Self::Polling => MessageName::Polling,
            Self::StartDownloadFile { .. } => MessageName::StartDownloadFile,
            Self::DownloadProgress { .. } => MessageName::DownloadProgress,
            Self::FileDownloaded { .. } => MessageName::FileDownloaded,
            Self::AllFilesDownloaded => MessageName::AllFilesDownloaded,
            Self::UpdateProgress { .. } => MessageName::UpdateProgress,
            Self::UpdateFinished { .. } => MessageName::UpdateFinished,
            Self::Error { .. } => MessageName::Error,
            Self::UpdateAvailable { .. } => MessageName::UpdateAvailable,
        }
    }

    fn percentage(&self) -> Option<f64> {
        match self {
            Self::DownloadProgress { percentage, .. } | Self::UpdateProgress { percentage, .. } => {
                Some(*percentage)
            }
            _ => None,
        }
    }
}

fn clamp_percentage(pct: f64) -> f64 {
    if pct.is_nan() {
        0.0
    } else {
        pct.clamp(0.0, 100.0)
    }
}

/// A notification from the agent: either a status or an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Status(Status),
    Event(Event),
}

impl From<Status> for Message {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl Message {
    pub fn name(&self) -> MessageName {
        match self {
            Self::Status(s) => s.name(),
            Self::Event(e) => e.name(),
        }
    }

    pub fn description(&self) -> &'static str {
        self.name().description()
    }

    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status(_))
    }

    /// Full JSON form: discriminator, description and every variant field.
    ///
    /// Percentages are clamped to `0..=100` (NaN encodes as 0) so every
    /// encoded payload decodes.
    pub fn to_value(&self) -> Value {
        let encoded = match self {
            Self::Status(s) => serde_json::to_value(s),
            Self::Event(e) => serde_json::to_value(e),
        };
        let mut value = encoded.unwrap_or_else(|_| Value::Object(Default::default()));
        if let Some(obj) = value.as_object_mut() {
            obj.insert("name".to_owned(), Value::from(self.name().as_str()));
            obj.insert("description".to_owned(), Value::from(self.description()));
            if let Some(pct) = self.percentage() {
                obj.insert("percentage".to_owned(), Value::from(clamp_percentage(pct)));
            }
        }
        value
    }

    fn percentage(&self) -> Option<f64> {
        match self {
            Self::Event(e) => e.percentage(),
            Self::Status(_) => None,
        }
    }

    /// Summary JSON form: discriminator and description only.
    ///
    /// This is the shape understood by first-generation subscribers.
    pub fn to_summary_value(&self) -> Value {
        serde_json::json!({
            "name": self.name().as_str(),
            "description": self.description(),
        })
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode a full JSON form, dispatching on the `name` discriminator.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Some(obj) = value.as_object() else {
            return Err(DecodeError::InvalidJson("expected a JSON object".to_owned()));
        };
        let name: MessageName = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingName)?
            .parse()?;

        let invalid = |reason: String| DecodeError::InvalidFields {
            name: name.as_str().to_owned(),
            reason,
        };

        if name.is_status() {
            let status: Status = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
            return Ok(Self::Status(status));
        }

        let event: Event = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
        if let Some(pct) = event.percentage() {
            if !(0.0..=100.0).contains(&pct) {
                return Err(invalid(format!("percentage {pct} outside 0..=100")));
            }
        }
        Ok(Self::Event(event))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().as_str())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
