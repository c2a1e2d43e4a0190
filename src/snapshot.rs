// Decoding of `/connections` payloads

use crate::connection::ConnectionSnapshot;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

/// One point-in-time enumeration of the proxy's connections
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub download_total: Option<u64>,
    #[serde(default)]
    pub upload_total: Option<u64>,
    /// Clash reports `null` instead of `[]` when nothing is open
    #[serde(deserialize_with = "null_as_empty")]
    pub connections: Vec<ConnectionSnapshot>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ConnectionSnapshot>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ConnectionSnapshot>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode one raw payload. Records are returned in wire order, untouched.
pub fn decode_snapshot(payload: &str) -> Result<Snapshot> {
    let snapshot: Snapshot =
        serde_json::from_str(payload).context("Malformed connections snapshot")?;

    log::trace!(
        "Decoded snapshot with {} connection(s)",
        snapshot.connections.len()
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(connections: serde_json::Value) -> String {
        json!({
            "downloadTotal": 4096,
            "uploadTotal": 1024,
            "connections": connections,
        })
        .to_string()
    }

    #[test]
    fn test_decode_preserves_order() {
        let text = payload(json!([
            {
                "id": "b",
                "upload": 1, "download": 2,
                "start": "2024-03-01T10:00:00Z",
                "chains": ["Proxy", "HK-01"],
                "rule": "DomainSuffix",
                "rulePayload": "example.com",
                "metadata": {
                    "network": "tcp", "type": "HTTP",
                    "sourceIP": "10.0.0.2", "destinationIP": "",
                    "sourcePort": 51000, "destinationPort": 80,
                    "host": "example.com",
                    "processPath": "/usr/bin/curl"
                }
            },
            {
                "id": "a",
                "upload": 0, "download": 0,
                "start": "2024-03-01T10:00:01Z",
                "chains": ["DIRECT"],
                "rule": "Match",
                "metadata": {
                    "network": "udp", "type": "Socks5",
                    "sourceIP": "10.0.0.2", "destinationIP": "8.8.8.8",
                    "sourcePort": "51001", "destinationPort": "53",
                    "host": ""
                }
            }
        ]));

        let snapshot = decode_snapshot(&text).unwrap();
        assert_eq!(snapshot.download_total, Some(4096));
        assert_eq!(snapshot.upload_total, Some(1024));

        let ids: Vec<_> = snapshot.connections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        // Numeric ports are normalized to strings
        let first = &snapshot.connections[0];
        assert_eq!(first.metadata.source_port, "51000");
        assert_eq!(first.metadata.destination_port, "80");
        assert_eq!(first.rule_payload, "example.com");
        assert_eq!(first.metadata.process_path.as_deref(), Some("/usr/bin/curl"));
        assert_eq!(snapshot.connections[1].metadata.process_path, None);
    }

    #[test]
    fn test_null_connections_is_empty() {
        let snapshot = decode_snapshot(&payload(serde_json::Value::Null)).unwrap();
        assert!(snapshot.connections.is_empty());
    }

    #[test]
    fn test_missing_connections_is_error() {
        assert!(decode_snapshot(r#"{"downloadTotal": 1}"#).is_err());
    }

    #[test]
    fn test_missing_metadata_field_is_error() {
        let text = payload(json!([{
            "id": "x",
            "upload": 0, "download": 0,
            "start": "2024-03-01T10:00:00Z",
            "chains": [],
            "rule": "Match",
            "metadata": { "network": "tcp" }
        }]));

        let err = decode_snapshot(&text).unwrap_err();
        assert!(format!("{:#}", err).contains("Malformed connections snapshot"));
    }

    #[test]
    fn test_not_json_is_error() {
        assert!(decode_snapshot("<html>").is_err());
    }
}
