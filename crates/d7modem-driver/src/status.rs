use std::fmt;

use serde::Serialize;

/// Outcome of a modem command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModemStatus {
    /// An asynchronous command was sent; completion arrives via callback.
    Processing,
    /// Another command is still in flight. Nothing was sent.
    Busy,
    /// No completed tag response arrived in time.
    Timeout,
    /// The modem reported the command completed without error.
    CompletedSuccess,
    /// The modem reported the command completed with an error.
    CompletedError,
}

impl ModemStatus {
    pub(crate) fn completed(with_error: bool) -> Self {
        if with_error {
            ModemStatus::CompletedError
        } else {
            ModemStatus::CompletedSuccess
        }
    }

    /// Whether the command completed successfully.
    pub fn is_success(self) -> bool {
        self == ModemStatus::CompletedSuccess
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModemStatus::Processing => "processing",
            ModemStatus::Busy => "busy",
            ModemStatus::Timeout => "timeout",
            ModemStatus::CompletedSuccess => "completed_success",
            ModemStatus::CompletedError => "completed_error",
        }
    }
}

impl fmt::Display for ModemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
