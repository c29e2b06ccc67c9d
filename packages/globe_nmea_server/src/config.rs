use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::server::AcceptErrorPolicy;
use crate::session::SessionConfig;

// =============================================================================
// File config (figment-deserialized from defaults / config file / env / CLI)
// =============================================================================
//
// Layers, lowest priority first:
//
//   struct defaults
//   --config <file.toml>        port = 4000
//   env vars                    GLOBE_NMEA_PORT=4000
//   CLI flags                   --port 4000
//
// The boat UUID only comes from the command line.

pub const DEFAULT_HOST: &str = "https://api.marineverse.com";
pub const DEFAULT_PORT: u16 = 3006;
pub const ENV_PREFIX: &str = "GLOBE_NMEA_";

/// Tunables, as read from defaults, the config file, env vars and CLI flags.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_push_interval_secs")]
    pub push_interval_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Upstream request timeout; unset keeps the HTTP client's default (none)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Pause after a failed accept; 0 retries immediately
    #[serde(default)]
    pub accept_error_pause_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bind_address: default_bind_address(),
            refresh_interval_secs: default_refresh_interval_secs(),
            push_interval_secs: default_push_interval_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            keepalive_secs: default_keepalive_secs(),
            request_timeout_secs: None,
            accept_error_pause_ms: 0,
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_refresh_interval_secs() -> u64 {
    600
}
fn default_push_interval_secs() -> u64 {
    5
}
fn default_write_timeout_secs() -> u64 {
    5
}
fn default_keepalive_secs() -> u64 {
    30
}

/// Values given on the command line. Unset fields don't override lower layers.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Build a figment that layers: defaults → config file → GLOBE_NMEA_* env vars → CLI.
pub fn load_config(config_file: Option<&Path>, cli: &CliOverrides) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(cli))
}

// =============================================================================
// Runtime config (validated, used throughout the server)
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("boat UUID is required")]
    MissingBoatId,

    #[error("invalid host URL {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("{name} must be at most {max} seconds")]
    IntervalTooLong { name: &'static str, max: u64 },

    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}

/// Validated configuration. Immutable once built.
#[derive(Clone, Debug)]
pub struct Config {
    /// Upstream API host, as given
    pub host: String,
    pub listen_addr: SocketAddr,
    pub boat_id: String,
    pub refresh_interval: Duration,
    pub request_timeout: Option<Duration>,
    pub session: SessionConfig,
    pub accept_policy: AcceptErrorPolicy,
}

impl Config {
    /// Resolve all layers and validate the result
    pub fn load(
        config_file: Option<&Path>,
        cli: &CliOverrides,
        boat_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let fc: FileConfig = load_config(config_file, cli).extract()?;
        Self::from_file(&fc, boat_id)
    }

    pub fn from_file(fc: &FileConfig, boat_id: impl Into<String>) -> Result<Self, ConfigError> {
        let boat_id = boat_id.into();
        if boat_id.trim().is_empty() {
            return Err(ConfigError::MissingBoatId);
        }
        validate_host(&fc.host)?;

        Ok(Self {
            host: fc.host.clone(),
            listen_addr: SocketAddr::new(fc.bind_address, fc.port),
            boat_id,
            refresh_interval: non_zero_secs("refresh_interval_secs", fc.refresh_interval_secs)?,
            request_timeout: match fc.request_timeout_secs {
                Some(secs) => Some(non_zero_secs("request_timeout_secs", secs)?),
                None => None,
            },
            session: SessionConfig {
                push_interval: non_zero_secs("push_interval_secs", fc.push_interval_secs)?,
                write_timeout: non_zero_secs("write_timeout_secs", fc.write_timeout_secs)?,
                keepalive: non_zero_secs("keepalive_secs", fc.keepalive_secs)?,
            },
            accept_policy: AcceptErrorPolicy {
                pause: Duration::from_millis(fc.accept_error_pause_ms),
            },
        })
    }
}

fn validate_host(host: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidHost {
        host: host.to_string(),
        reason,
    };
    let url = reqwest::Url::parse(host).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// Longest interval or timeout accepted from config (one week)
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

fn non_zero_secs(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    match secs {
        0 => Err(ConfigError::ZeroInterval(name)),
        s if s > MAX_INTERVAL_SECS => Err(ConfigError::IntervalTooLong {
            name,
            max: MAX_INTERVAL_SECS,
        }),
        s => Ok(Duration::from_secs(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let d = FileConfig::default();
        assert_eq!(d.host, "https://api.marineverse.com");
        assert_eq!(d.port, 3006);
        assert_eq!(d.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(d.refresh_interval_secs, 600);
        assert_eq!(d.push_interval_secs, 5);
        assert_eq!(d.write_timeout_secs, 5);
        assert_eq!(d.keepalive_secs, 30);
        assert!(d.request_timeout_secs.is_none());
        assert_eq!(d.accept_error_pause_ms, 0);
    }

    #[test]
    fn test_config_from_defaults() {
        let c = Config::from_file(&FileConfig::default(), "abc-123").unwrap();
        assert_eq!(c.boat_id, "abc-123");
        assert_eq!(c.listen_addr, "0.0.0.0:3006".parse().unwrap());
        assert_eq!(c.refresh_interval, Duration::from_secs(600));
        assert_eq!(c.session.push_interval, Duration::from_secs(5));
        assert_eq!(c.session.write_timeout, Duration::from_secs(5));
        assert_eq!(c.session.keepalive, Duration::from_secs(30));
        assert!(c.request_timeout.is_none());
        assert!(c.accept_policy.pause.is_zero());
    }

    // ── validation ──────────────────────────────────────────────────────

    #[test]
    fn test_empty_boat_id_rejected() {
        let err = Config::from_file(&FileConfig::default(), "").unwrap_err();
        assert!(matches!(err, ConfigError::MissingBoatId));
        assert_eq!(err.to_string(), "boat UUID is required");

        let err = Config::from_file(&FileConfig::default(), "   ").unwrap_err();
        assert!(matches!(err, ConfigError::MissingBoatId));
    }

    #[test]
    fn test_unparsable_host_rejected() {
        let fc = FileConfig {
            host: "not a url".to_string(),
            ..Default::default()
        };
        let err = Config::from_file(&fc, "abc-123").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHost { .. }), "got {err:?}");
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let fc = FileConfig {
            host: "ftp://example.com".to_string(),
            ..Default::default()
        };
        let err = Config::from_file(&fc, "abc-123").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_http_host_with_port_accepted() {
        let fc = FileConfig {
            host: "http://localhost:8080".to_string(),
            ..Default::default()
        };
        let c = Config::from_file(&fc, "abc-123").unwrap();
        assert_eq!(c.host, "http://localhost:8080");
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let fc = FileConfig {
            push_interval_secs: 0,
            ..Default::default()
        };
        let err = Config::from_file(&fc, "abc-123").unwrap_err();
        assert_eq!(err.to_string(), "push_interval_secs must be greater than zero");

        let fc = FileConfig {
            request_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Config::from_file(&fc, "abc-123"),
            Err(ConfigError::ZeroInterval("request_timeout_secs"))
        ));
    }

    #[test]
    fn test_oversized_intervals_rejected() {
        let fc = FileConfig {
            push_interval_secs: u64::MAX,
            ..Default::default()
        };
        let err = Config::from_file(&fc, "abc-123").unwrap_err();
        assert_eq!(err.to_string(), "push_interval_secs must be at most 604800 seconds");

        for fc in [
            FileConfig {
                refresh_interval_secs: MAX_INTERVAL_SECS + 1,
                ..Default::default()
            },
            FileConfig {
                write_timeout_secs: u64::MAX,
                ..Default::default()
            },
            FileConfig {
                keepalive_secs: u64::MAX,
                ..Default::default()
            },
            FileConfig {
                request_timeout_secs: Some(u64::MAX),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                Config::from_file(&fc, "abc-123"),
                Err(ConfigError::IntervalTooLong { .. })
            ));
        }

        let fc = FileConfig {
            refresh_interval_secs: MAX_INTERVAL_SECS,
            ..Default::default()
        };
        let c = Config::from_file(&fc, "abc-123").unwrap();
        assert_eq!(c.refresh_interval, Duration::from_secs(MAX_INTERVAL_SECS));
    }

    #[test]
    fn test_huge_env_interval_is_a_config_error() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GLOBE_NMEA_PUSH_INTERVAL_SECS", "18446744073709551615");
            let err = Config::load(None, &CliOverrides::default(), "abc-123").unwrap_err();
            assert!(matches!(
                err,
                ConfigError::IntervalTooLong {
                    name: "push_interval_secs",
                    ..
                }
            ));
            Ok(())
        });
    }

    #[test]
    fn test_request_timeout_and_accept_pause() {
        let fc = FileConfig {
            request_timeout_secs: Some(10),
            accept_error_pause_ms: 250,
            ..Default::default()
        };
        let c = Config::from_file(&fc, "abc-123").unwrap();
        assert_eq!(c.request_timeout, Some(Duration::from_secs(10)));
        assert_eq!(c.accept_policy.pause, Duration::from_millis(250));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        figment::Jail::expect_with(|_jail| {
            let fc: FileConfig = load_config(None, &CliOverrides::default()).extract()?;
            assert_eq!(fc, FileConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_config_file_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("relay.toml");
        std::fs::write(
            &path,
            "host = \"http://10.0.0.1:9000\"\nport = 4000\npush_interval_secs = 2\n",
        )
        .unwrap();

        figment::Jail::expect_with(|_jail| {
            let fc: FileConfig =
                load_config(Some(&path), &CliOverrides::default()).extract()?;
            assert_eq!(fc.host, "http://10.0.0.1:9000");
            assert_eq!(fc.port, 4000);
            assert_eq!(fc.push_interval_secs, 2);
            assert_eq!(fc.write_timeout_secs, 5);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("relay.toml", "port = 4000\nkeepalive_secs = 10\n")?;
            jail.set_env("GLOBE_NMEA_PORT", "5000");

            let fc: FileConfig =
                load_config(Some(Path::new("relay.toml")), &CliOverrides::default())
                    .extract()?;
            assert_eq!(fc.port, 5000);
            assert_eq!(fc.keepalive_secs, 10);
            Ok(())
        });
    }

    #[test]
    fn test_cli_overrides_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GLOBE_NMEA_PORT", "5000");
            jail.set_env("GLOBE_NMEA_HOST", "http://from-env");

            let cli = CliOverrides {
                port: Some(6000),
                ..Default::default()
            };
            let fc: FileConfig = load_config(None, &cli).extract()?;
            assert_eq!(fc.port, 6000);
            assert_eq!(fc.host, "http://from-env");
            Ok(())
        });
    }

    #[test]
    fn test_config_load_validates() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GLOBE_NMEA_HOST", "::::");
            let err = Config::load(None, &CliOverrides::default(), "abc-123").unwrap_err();
            assert!(matches!(err, ConfigError::InvalidHost { .. }));
            Ok(())
        });
    }
}
