//! Endpoint list importers: plain `address:port` lists and proxy client
//! configs with an `outbounds` array.

use crate::endpoint::{Defaults, DEFAULT_PATH};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("line {line}: expected address:port, got '{content}'")]
    InvalidLine { line: usize, content: String },

    #[error("line {line}: invalid port '{port}'")]
    InvalidPort { line: usize, port: String },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parse newline-separated `address:port` entries.
///
/// Blank lines are ignored. Lines that are not exactly `address:port` with a
/// port in 1..=65535 are logged and skipped; they never abort the import.
pub fn parse_server_list(text: &str) -> Vec<(String, u16)> {
    text.lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let line = raw.trim();
            if line.is_empty() {
                return None;
            }
            match parse_line(i + 1, line) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    debug!(error = %e, "Skipping server line");
                    None
                }
            }
        })
        .collect()
}

fn parse_line(line_no: usize, line: &str) -> Result<(String, u16), ImportError> {
    let invalid = || ImportError::InvalidLine {
        line: line_no,
        content: line.to_string(),
    };

    let mut parts = line.split(':');
    let (host, port) = match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => (host.trim(), port.trim()),
        _ => return Err(invalid()),
    };
    if host.is_empty() {
        return Err(invalid());
    }

    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok((host.to_string(), p)),
        _ => Err(ImportError::InvalidPort {
            line: line_no,
            port: port.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ClientConfig {
    #[serde(default)]
    outbounds: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Outbound {
    #[serde(default, rename = "type")]
    kind: String,
    server: Option<String>,
    server_port: Option<u16>,
    uuid: Option<String>,
    tls: Option<TlsSection>,
    transport: Option<TransportSection>,
}

#[derive(Debug, Deserialize)]
struct TlsSection {
    server_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransportSection {
    path: Option<String>,
}

/// Servers and shared settings pulled from an `outbounds` config.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundImport {
    pub servers: Vec<(String, u16)>,
    /// Present when the config had at least one outbound.
    pub settings: Option<ImportedSettings>,
}

/// Shared settings found in the first outbound. Fields the outbound does not
/// carry stay `None` so they never mask configured values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedSettings {
    pub uuid: Option<String>,
    pub server_name: Option<String>,
    pub path: Option<String>,
}

impl ImportedSettings {
    /// Overlay the fields present in the import onto `base`.
    pub fn apply_to(&self, base: Defaults) -> Defaults {
        Defaults {
            uuid: self.uuid.clone().unwrap_or(base.uuid),
            server_name: self.server_name.clone().unwrap_or(base.server_name),
            path: self.path.clone().unwrap_or(base.path),
        }
    }
}

/// Extract `vless` outbounds and the shared credential/SNI/path settings.
///
/// Settings come from the first outbound of any type. A `transport` section
/// without a `path` means the root path.
pub fn parse_outbounds(json: &str) -> Result<OutboundImport, ImportError> {
    let config: ClientConfig = serde_json::from_str(json)?;

    // A malformed entry only loses itself.
    let outbounds: Vec<Option<Outbound>> = config
        .outbounds
        .into_iter()
        .enumerate()
        .map(|(i, value)| match serde_json::from_value::<Outbound>(value) {
            Ok(o) => Some(o),
            Err(e) => {
                debug!(index = i, error = %e, "Skipping malformed outbound");
                None
            }
        })
        .collect();

    let servers = outbounds
        .iter()
        .flatten()
        .filter(|o| o.kind == "vless")
        .filter_map(|o| match (&o.server, o.server_port) {
            (Some(server), Some(port)) if !server.is_empty() && port != 0 => {
                Some((server.clone(), port))
            }
            _ => {
                debug!(server = ?o.server, port = ?o.server_port, "Skipping incomplete outbound");
                None
            }
        })
        .collect();

    let settings = outbounds.first().map(|first| match first {
        Some(first) => ImportedSettings {
            uuid: first.uuid.clone(),
            server_name: first.tls.as_ref().and_then(|t| t.server_name.clone()),
            path: first.transport.as_ref().map(|t| {
                t.path.clone().unwrap_or_else(|| DEFAULT_PATH.to_string())
            }),
        },
        None => ImportedSettings::default(),
    });

    Ok(OutboundImport { servers, settings })
}

fn read(path: &Path) -> Result<String, ImportError> {
    std::fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_text_file(path: impl AsRef<Path>) -> Result<Vec<(String, u16)>, ImportError> {
    Ok(parse_server_list(&read(path.as_ref())?))
}

pub fn load_outbounds_file(path: impl AsRef<Path>) -> Result<OutboundImport, ImportError> {
    parse_outbounds(&read(path.as_ref())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_malformed_line() {
        let servers = parse_server_list("1.2.3.4:443\nbad-line\n5.6.7.8:8443\n");
        assert_eq!(
            servers,
            vec![("1.2.3.4".to_string(), 443), ("5.6.7.8".to_string(), 8443)]
        );
    }

    #[test]
    fn test_parse_trims_and_rejects_bad_ports() {
        let text = "  10.0.0.1 : 443  \n\n10.0.0.2:http\n10.0.0.3:70000\n10.0.0.4:0\n:443\n::1:443\n";
        let servers = parse_server_list(text);
        assert_eq!(servers, vec![("10.0.0.1".to_string(), 443)]);
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(matches!(
            parse_line(3, "nope"),
            Err(ImportError::InvalidLine { line: 3, .. })
        ));
        assert!(matches!(
            parse_line(1, "host:abc"),
            Err(ImportError::InvalidPort { line: 1, .. })
        ));
    }

    #[test]
    fn test_parse_outbounds() {
        let json = r#"{
            "log": {"level": "warn"},
            "outbounds": [
                {
                    "type": "vless",
                    "tag": "proxy",
                    "server": "81.255.155.10",
                    "server_port": 443,
                    "uuid": "32a53867-a558-45a9-a73d-4844c375f0c8",
                    "tls": {"enabled": true, "server_name": "cdn.example.org"},
                    "transport": {"type": "ws", "path": "/ray"}
                },
                {"type": "direct", "tag": "direct"},
                {"type": "vless", "server": "192.243.113.108", "server_port": 8443},
                {"type": "vless", "server": "no-port.example"},
                {"type": "vless", "server": "big-port.example", "server_port": 99999}
            ]
        }"#;

        let import = parse_outbounds(json).unwrap();
        assert_eq!(
            import.servers,
            vec![
                ("81.255.155.10".to_string(), 443),
                ("192.243.113.108".to_string(), 8443)
            ]
        );
        let settings = import.settings.unwrap();
        assert_eq!(
            settings.uuid.as_deref(),
            Some("32a53867-a558-45a9-a73d-4844c375f0c8")
        );
        assert_eq!(settings.server_name.as_deref(), Some("cdn.example.org"));
        assert_eq!(settings.path.as_deref(), Some("/ray"));
    }

    #[test]
    fn test_missing_sections_keep_configured_values() {
        let json = r#"{"outbounds": [{"type": "vless", "server": "h", "server_port": 1}]}"#;
        let settings = parse_outbounds(json).unwrap().settings.unwrap();
        assert_eq!(settings, ImportedSettings::default());

        let base = Defaults {
            uuid: "cfg-uuid".to_string(),
            server_name: "cfg.example".to_string(),
            path: "/cfg".to_string(),
        };
        assert_eq!(settings.apply_to(base.clone()), base);

        let empty = parse_outbounds(r#"{"inbounds": []}"#).unwrap();
        assert!(empty.servers.is_empty());
        assert!(empty.settings.is_none());
    }

    #[test]
    fn test_imported_fields_override_only_what_they_carry() {
        let json = r#"{"outbounds": [
            {"type": "vless", "server": "h", "server_port": 1,
             "tls": {"enabled": true}, "transport": {"type": "ws"}}
        ]}"#;
        let settings = parse_outbounds(json).unwrap().settings.unwrap();
        assert_eq!(settings.server_name, None);
        assert_eq!(settings.path.as_deref(), Some("/"));

        let merged = settings.apply_to(Defaults {
            uuid: "cfg-uuid".to_string(),
            server_name: "cfg.example".to_string(),
            path: "/cfg".to_string(),
        });
        assert_eq!(merged.uuid, "cfg-uuid");
        assert_eq!(merged.server_name, "cfg.example");
        assert_eq!(merged.path, "/");
    }

    #[test]
    fn test_parse_outbounds_rejects_bad_json() {
        assert!(matches!(parse_outbounds("{not json"), Err(ImportError::Json(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_text_file("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }
}
