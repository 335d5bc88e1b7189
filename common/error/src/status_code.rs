//! Status codes for error classification.
//!
//! Codes are five digits, `XX_YYY`: the leading two digits select a
//! [`StatusCategory`], the rest number the code within it.

use strum::AsRefStr;
use strum::Display;
use strum::EnumIter;
use strum::FromRepr;
use strum::IntoStaticStr;

/// Broad family of a [`StatusCode`], taken from its leading digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Success,
    /// Unexpected or external failures.
    Common,
    /// Rejected arguments or documents.
    Input,
    IO,
    Network,
    Config,
    /// Resolution, materialization and loading of plugins.
    Plugin,
    /// Time and size bounds.
    Resource,
}

/// Handling hints attached to every code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMeta {
    pub retryable: bool,
    pub log_error: bool,
    pub category: StatusCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, FromRepr, IntoStaticStr)]
#[repr(i32)]
pub enum StatusCode {
    Success = 0,

    Unknown = 1_000,
    /// A bug.
    Internal = 1_001,
    Unsupported = 1_002,
    /// A child process (node, git, curl, tar) failed.
    External = 1_003,

    InvalidArguments = 2_000,
    ParseError = 2_001,
    AlreadyExists = 2_002,

    IoError = 3_000,
    FileNotFound = 3_001,
    /// A persisted store or cache file is unusable.
    StorageUnavailable = 3_002,

    NetworkError = 4_000,

    InvalidConfig = 10_000,
    ConfigFileError = 10_001,

    /// Plugin directory or manifest is malformed.
    InvalidPlugin = 11_000,
    DependencyUnresolved = 11_001,
    PluginLoadFailed = 11_002,
    /// A module was read mid-initialization; usually clears on retry.
    PluginInitializing = 11_003,

    Timeout = 12_000,
}

impl StatusCode {
    pub fn is_success(code: i32) -> bool {
        code == Self::Success as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Self::from_repr(value)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    pub const fn category(self) -> StatusCategory {
        match self as i32 / 1_000 {
            0 => StatusCategory::Success,
            2 => StatusCategory::Input,
            3 => StatusCategory::IO,
            4 => StatusCategory::Network,
            10 => StatusCategory::Config,
            11 => StatusCategory::Plugin,
            12 => StatusCategory::Resource,
            _ => StatusCategory::Common,
        }
    }

    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkError | Self::PluginInitializing | Self::Timeout)
    }

    pub const fn should_log_error(self) -> bool {
        matches!(
            self,
            Self::Unknown | Self::Internal | Self::External | Self::PluginLoadFailed
        )
    }

    pub const fn meta(self) -> StatusMeta {
        StatusMeta {
            retryable: self.is_retryable(),
            log_error: self.should_log_error(),
            category: self.category(),
        }
    }
}

#[cfg(test)]
#[path = "status_code.test.rs"]
mod tests;
