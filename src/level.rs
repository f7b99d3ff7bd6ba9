//! Syslog-style severity levels.
//!
//! Lower discriminants are more severe. A threshold admits a record when the
//! threshold is numerically greater than or equal to the record's level, so
//! `Severity::Debug` admits everything and `Severity::Emerg` admits only
//! emergencies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Severity {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Error = 3,
    #[default]
    Warn = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

/// Error returned when a string or number does not name a severity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid severity: {0}")]
pub struct InvalidSeverity(pub String);

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 8] = [
        Severity::Emerg,
        Severity::Alert,
        Severity::Crit,
        Severity::Error,
        Severity::Warn,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
    ];

    /// Return `true` when a record at `level` passes a threshold of `self`.
    pub fn admits(self, level: Severity) -> bool {
        self >= level
    }

    /// Upper-case name as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Emerg => "EMERG",
            Severity::Alert => "ALERT",
            Severity::Crit => "CRIT",
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = InvalidSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMERG" | "EMERGENCY" => Ok(Self::Emerg),
            "ALERT" => Ok(Self::Alert),
            "CRIT" | "CRITICAL" => Ok(Self::Crit),
            "ERROR" | "ERR" => Ok(Self::Error),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "NOTICE" => Ok(Self::Notice),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            _ => Err(InvalidSeverity(s.to_owned())),
        }
    }
}

impl From<Severity> for u8 {
    fn from(level: Severity) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for Severity {
    type Error = InvalidSeverity;

    fn try_from(value: u8) -> Result<Self, InvalidSeverity> {
        Severity::ALL
            .get(usize::from(value))
            .copied()
            .ok_or_else(|| InvalidSeverity(value.to_string()))
    }
}
