use crate::rate::{Counters, Rates};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// One connection as reported by the proxy's `/connections` endpoint
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub id: String,
    pub upload: u64,   // cumulative bytes
    pub download: u64, // cumulative bytes
    pub start: String, // RFC 3339
    pub chains: Vec<String>,
    pub rule: String,
    #[serde(default)]
    pub rule_payload: String,
    pub metadata: ConnectionMetadata,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectionMetadata {
    pub network: String,
    #[serde(rename = "type")]
    pub conn_type: String,
    #[serde(rename = "sourceIP")]
    pub source_ip: String,
    #[serde(rename = "destinationIP")]
    pub destination_ip: String,
    #[serde(rename = "sourcePort", deserialize_with = "string_or_number")]
    pub source_port: String,
    #[serde(rename = "destinationPort", deserialize_with = "string_or_number")]
    pub destination_port: String,
    pub host: String,
    #[serde(rename = "processPath", default)]
    pub process_path: Option<String>,
}

/// Some cores report ports as JSON strings, others as numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(text) => text,
        Port::Number(number) => number.to_string(),
    })
}

impl ConnectionSnapshot {
    pub fn counters(&self) -> Counters {
        Counters {
            upload: self.upload,
            download: self.download,
        }
    }
}

/// Display-ready connection row derived from a snapshot record
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionView {
    pub id: String,
    pub upload: u64,
    pub download: u64,
    /// Negated start time in milliseconds, so an ascending sort lists newest first
    pub start: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub chains: String,
    pub rule: String,
    pub rule_payload: String,
    /// `<host or destination ip>:<destination port>`
    pub host: String,
    pub destination_ip: String,
    pub destination_port: String,
    pub source_ip: String,
    pub source_port: String,
    pub network: String,
    /// `<type>(<network>)`
    pub conn_type: String,
    /// `<source ip>:<source port>`
    pub source: String,
    pub process_path: Option<String>,
    pub upload_speed_curr: i64,   // bytes since previous tick
    pub download_speed_curr: i64, // bytes since previous tick
}

impl ConnectionView {
    pub fn from_snapshot(record: &ConnectionSnapshot, rates: Rates) -> Self {
        let meta = &record.metadata;

        // Direct IP connections carry an empty host
        let host = if meta.host.is_empty() {
            &meta.destination_ip
        } else {
            &meta.host
        };

        let started_at = match DateTime::parse_from_rfc3339(&record.start) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                log::warn!(
                    "Connection {} has unparseable start time {:?}: {}",
                    record.id,
                    record.start,
                    e
                );
                None
            }
        };

        Self {
            id: record.id.clone(),
            upload: record.upload,
            download: record.download,
            start: started_at.map(|ts| -ts.timestamp_millis()).unwrap_or(0),
            started_at,
            chains: record
                .chains
                .iter()
                .rev()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" / "),
            rule: record.rule.clone(),
            rule_payload: record.rule_payload.clone(),
            host: format!("{}:{}", host, meta.destination_port),
            destination_ip: meta.destination_ip.clone(),
            destination_port: meta.destination_port.clone(),
            source_ip: meta.source_ip.clone(),
            source_port: meta.source_port.clone(),
            network: meta.network.clone(),
            conn_type: format!("{}({})", meta.conn_type, meta.network),
            source: format!("{}:{}", meta.source_ip, meta.source_port),
            process_path: meta.process_path.clone(),
            upload_speed_curr: rates.upload,
            download_speed_curr: rates.download,
        }
    }

    pub fn counters(&self) -> Counters {
        Counters {
            upload: self.upload,
            download: self.download,
        }
    }

    pub fn rates(&self) -> Rates {
        Rates {
            upload: self.upload_speed_curr,
            download: self.download_speed_curr,
        }
    }

    /// Fields the keyword filter searches
    pub fn searchable_fields(&self) -> [&str; 8] {
        [
            self.host.as_str(),
            self.source_ip.as_str(),
            self.source_port.as_str(),
            self.destination_ip.as_str(),
            self.chains.as_str(),
            self.rule.as_str(),
            self.conn_type.as_str(),
            self.network.as_str(),
        ]
    }

    pub fn format_bytes(bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Per-tick delta; a negative value means the proxy reset its counters
    pub fn format_rate(delta: i64) -> String {
        if delta < 0 {
            return "reset".to_string();
        }
        format!("{}/s", Self::format_bytes(delta as u64))
    }

    /// Connection age like "42s", "3m", "5h" or "2d"
    pub fn format_age(&self, now: DateTime<Utc>) -> String {
        let Some(started_at) = self.started_at else {
            return "-".to_string();
        };

        let secs = (now - started_at).num_seconds().max(0);
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 60 * 60 {
            format!("{}m", secs / 60)
        } else if secs < 24 * 60 * 60 {
            format!("{}h", secs / (60 * 60))
        } else {
            format!("{}d", secs / (24 * 60 * 60))
        }
    }
}

/// Column the active table is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Newest,
    Host,
    DownloadSpeed,
    UploadSpeed,
    TotalDownload,
    TotalUpload,
}

impl SortKey {
    pub fn next(self) -> Self {
        match self {
            SortKey::Newest => SortKey::Host,
            SortKey::Host => SortKey::DownloadSpeed,
            SortKey::DownloadSpeed => SortKey::UploadSpeed,
            SortKey::UploadSpeed => SortKey::TotalDownload,
            SortKey::TotalDownload => SortKey::TotalUpload,
            SortKey::TotalUpload => SortKey::Newest,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Newest => "Newest",
            SortKey::Host => "Host",
            SortKey::DownloadSpeed => "DL Speed",
            SortKey::UploadSpeed => "UL Speed",
            SortKey::TotalDownload => "Total DL",
            SortKey::TotalUpload => "Total UL",
        }
    }
}

/// Stable sort of a read-time projection; the underlying state is untouched
pub fn sort_views(views: &mut [&ConnectionView], key: SortKey) {
    match key {
        SortKey::Newest => views.sort_by_key(|v| v.start),
        SortKey::Host => views.sort_by(|a, b| a.host.cmp(&b.host)),
        SortKey::DownloadSpeed => {
            views.sort_by(|a, b| b.download_speed_curr.cmp(&a.download_speed_curr))
        }
        SortKey::UploadSpeed => views.sort_by(|a, b| b.upload_speed_curr.cmp(&a.upload_speed_curr)),
        SortKey::TotalDownload => views.sort_by(|a, b| b.download.cmp(&a.download)),
        SortKey::TotalUpload => views.sort_by(|a, b| b.upload.cmp(&a.upload)),
    }
}
