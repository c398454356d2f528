use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use d7modem_driver::ModemStatus;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Outcome of one modem command, as printed by every subcommand.
#[derive(Debug, Serialize)]
pub struct CommandReport {
    pub command: &'static str,
    pub status: ModemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    /// Hex-encoded file data (read result or pushed value).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    pub elapsed_ms: u64,
    pub timestamp: String,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl CommandReport {
    pub fn new(command: &'static str, status: ModemStatus, elapsed: Duration) -> Self {
        Self {
            command,
            status,
            file_id: None,
            offset: None,
            data: None,
            sequence: None,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            timestamp: now_unix_seconds(),
            raw: Vec::new(),
        }
    }

    pub fn with_file(mut self, file_id: u8, offset: u32) -> Self {
        self.file_id = Some(file_id);
        self.offset = Some(offset);
        self
    }

    pub fn with_data(mut self, data: &[u8]) -> Self {
        self.data = Some(to_hex(data));
        self.raw = data.to_vec();
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

pub fn print_report(report: &CommandReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "STATUS", "FILE", "OFFSET", "DATA", "MS"])
                .add_row(vec![
                    report.command.to_string(),
                    report.status.to_string(),
                    optional(report.file_id.map(|id| format!("0x{id:02X}"))),
                    optional(report.offset.map(|offset| offset.to_string())),
                    optional(report.data.clone()),
                    report.elapsed_ms.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!("{} status={}", report.command, report.status);
            if let (Some(file_id), Some(offset)) = (report.file_id, report.offset) {
                let _ = write!(line, " file=0x{file_id:02X} offset={offset}");
            }
            if let Some(sequence) = report.sequence {
                let _ = write!(line, " seq={sequence}");
            }
            if let Some(data) = &report.data {
                let _ = write!(line, " data={data}");
            }
            let _ = write!(line, " elapsed={}ms", report.elapsed_ms);
            println!("{line}");
        }
        OutputFormat::Raw => {
            print_raw(&report.raw);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_hex(data: &[u8]) -> String {
    data.iter().fold(String::with_capacity(data.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(to_hex(&[0x00, 0x0B, 0xFF]), "000bff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn json_report_omits_absent_fields() {
        let report = CommandReport::new("ping", ModemStatus::CompletedSuccess, Duration::ZERO);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "completed_success");
        assert!(json.get("file_id").is_none());
        assert!(json.get("raw").is_none());
    }
}
