//! Destination URI parsing.
//!
//! - Bare path or `file://…` → file backend
//! - `syslog://[user@]host[:port][/tag]` → syslog over TCP (default port 514)
//! - `syslog:///path` → syslog over a Unix stream socket
//! - Any other scheme → plugin lookup

use std::path::PathBuf;

use crate::errors::{OmniError, Result};

/// Default syslog TCP port.
pub const SYSLOG_DEFAULT_PORT: u16 = 514;

/// A destination URI resolved to its backend kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedUri {
    File {
        path: PathBuf,
    },
    SyslogTcp {
        host: String,
        port: u16,
        user: Option<String>,
        tag: Option<String>,
    },
    SyslogUnix {
        path: PathBuf,
    },
    Plugin {
        scheme: String,
        rest: String,
    },
}

/// Parse a destination URI. Fails with `config_invalid` on malformed input.
pub fn parse(uri: &str) -> Result<ParsedUri> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(OmniError::ConfigInvalid("empty destination URI".into()));
    }

    let Some((scheme, rest)) = uri.split_once("://") else {
        // No scheme: a plain filesystem path.
        return Ok(ParsedUri::File {
            path: PathBuf::from(uri),
        });
    };

    match scheme {
        "file" => {
            if rest.is_empty() {
                return Err(OmniError::ConfigInvalid(format!("empty file path: '{}'", uri)));
            }
            Ok(ParsedUri::File {
                path: PathBuf::from(rest),
            })
        }
        "syslog" => parse_syslog(uri, rest),
        other => Ok(ParsedUri::Plugin {
            scheme: other.to_string(),
            rest: rest.to_string(),
        }),
    }
}

fn parse_syslog(uri: &str, rest: &str) -> Result<ParsedUri> {
    // syslog:///path has an empty authority and a leading slash in the rest.
    if let Some(path) = rest.strip_prefix('/') {
        if !path.is_empty() && !path.starts_with('/') {
            return Ok(ParsedUri::SyslogUnix {
                path: PathBuf::from(format!("/{}", path)),
            });
        }
    }

    let (authority, tag) = match rest.split_once('/') {
        Some((auth, t)) if !t.is_empty() => (auth, Some(t.to_string())),
        Some((auth, _)) => (auth, None),
        None => (rest, None),
    };

    let (user, host_port) = match authority.split_once('@') {
        Some((u, hp)) if !u.is_empty() => (Some(u.to_string()), hp),
        _ => (None, authority),
    };

    let (host, port) = match host_port.rsplit_once(':') {
        Some((h, p)) => {
            let port = p.parse::<u16>().map_err(|_| {
                OmniError::ConfigInvalid(format!("invalid syslog port in '{}'", uri))
            })?;
            (h, port)
        }
        None => (host_port, SYSLOG_DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(OmniError::ConfigInvalid(format!(
            "syslog URI needs a host or a socket path: '{}'",
            uri
        )));
    }

    Ok(ParsedUri::SyslogTcp {
        host: host.to_string(),
        port,
        user,
        tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_path_is_file() {
        assert_eq!(
            parse("/var/log/app.log").unwrap(),
            ParsedUri::File {
                path: PathBuf::from("/var/log/app.log")
            }
        );
        assert_eq!(
            parse("relative/app.log").unwrap(),
            ParsedUri::File {
                path: PathBuf::from("relative/app.log")
            }
        );
    }

    #[test]
    fn test_file_scheme() {
        assert_eq!(
            parse("file:///var/log/app.log").unwrap(),
            ParsedUri::File {
                path: PathBuf::from("/var/log/app.log")
            }
        );
    }

    #[test]
    fn test_syslog_tcp_defaults() {
        assert_eq!(
            parse("syslog://loghost").unwrap(),
            ParsedUri::SyslogTcp {
                host: "loghost".into(),
                port: SYSLOG_DEFAULT_PORT,
                user: None,
                tag: None,
            }
        );
    }

    #[test]
    fn test_syslog_tcp_full() {
        assert_eq!(
            parse("syslog://svc@loghost:1514/myapp").unwrap(),
            ParsedUri::SyslogTcp {
                host: "loghost".into(),
                port: 1514,
                user: Some("svc".into()),
                tag: Some("myapp".into()),
            }
        );
    }

    #[test]
    fn test_syslog_unix_socket() {
        assert_eq!(
            parse("syslog:///dev/log").unwrap(),
            ParsedUri::SyslogUnix {
                path: PathBuf::from("/dev/log")
            }
        );
    }

    #[test]
    fn test_other_scheme_is_plugin() {
        assert_eq!(
            parse("kafka://broker:9092/topic").unwrap(),
            ParsedUri::Plugin {
                scheme: "kafka".into(),
                rest: "broker:9092/topic".into(),
            }
        );
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(parse("").is_err());
        assert!(parse("syslog://host:notaport").is_err());
        assert!(parse("file://").is_err());
        assert!(parse("syslog://").is_err());
    }
}
