use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which tool produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Compress,
    Decompress,
    Encrypt,
    Decrypt,
    Merge,
    Split,
    Extract,
    Rotate,
    Watermark,
}

impl ToolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::Compress => "compress",
            ToolKind::Decompress => "decompress",
            ToolKind::Encrypt => "encrypt",
            ToolKind::Decrypt => "decrypt",
            ToolKind::Merge => "merge",
            ToolKind::Split => "split",
            ToolKind::Extract => "extract",
            ToolKind::Rotate => "rotate",
            ToolKind::Watermark => "watermark",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "compress" => Some(ToolKind::Compress),
            "decompress" => Some(ToolKind::Decompress),
            "encrypt" => Some(ToolKind::Encrypt),
            "decrypt" => Some(ToolKind::Decrypt),
            "merge" => Some(ToolKind::Merge),
            "split" => Some(ToolKind::Split),
            "extract" => Some(ToolKind::Extract),
            "rotate" => Some(ToolKind::Rotate),
            "watermark" => Some(ToolKind::Watermark),
            _ => None,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Processing,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Status::Processing),
            "completed" => Some(Status::Completed),
            "failed" => Some(Status::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One row of the processing ledger. Envelope runs additionally carry the
/// wrapped session key and IV (base64), since the ciphertext file itself has
/// no framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub id: String,
    pub file_name: String,
    pub original_size: u64,
    pub processed_size: u64,
    pub compression_ratio: f64,
    pub tool: ToolKind,
    pub status: Status,
    pub created_at: i64,
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
}

impl ProcessedFile {
    /// Fresh `processing` entry; sizes and output are filled in on completion.
    pub fn new(file_name: impl Into<String>, original_size: u64, tool: ToolKind) -> Self {
        Self {
            id: generate_id(),
            file_name: file_name.into(),
            original_size,
            processed_size: 0,
            compression_ratio: 0.0,
            tool,
            status: Status::Processing,
            created_at: unix_now(),
            output_path: None,
            encrypted_key: None,
            iv: None,
        }
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Millisecond timestamp in base36 plus a random base36 suffix.
pub fn generate_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let noise: u32 = rand::thread_rng().gen();
    format!("{}{}", to_base36(millis), to_base36(noise as u64))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.iter().rev().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(36 * 36 + 1), "101");
    }

    #[test]
    fn ids_are_unique_enough() {
        let a = generate_id();
        let b = generate_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn tool_kind_round_trips_through_strings() {
        for tool in [
            ToolKind::Compress,
            ToolKind::Decompress,
            ToolKind::Encrypt,
            ToolKind::Decrypt,
            ToolKind::Merge,
            ToolKind::Split,
            ToolKind::Extract,
            ToolKind::Rotate,
            ToolKind::Watermark,
        ] {
            assert_eq!(ToolKind::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolKind::parse("protect"), None);
    }

    #[test]
    fn record_starts_in_processing_state() {
        let record = ProcessedFile::new("report.pdf", 1234, ToolKind::Compress);
        assert_eq!(record.status, Status::Processing);
        assert_eq!(record.original_size, 1234);
        assert_eq!(record.processed_size, 0);
        assert!(record.output_path.is_none());
        assert!(record.created_at > 0);
    }

    #[test]
    fn record_serializes_with_lowercase_tags() {
        let record = ProcessedFile::new("a.bin", 1, ToolKind::Rotate);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"tool\":\"rotate\""));
        assert!(json.contains("\"status\":\"processing\""));
        // Optional envelope fields stay out of the JSON when unset.
        assert!(!json.contains("encrypted_key"));
    }
}
