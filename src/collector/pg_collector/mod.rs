//! PostgreSQL access for the collector and the profiler.
//!
//! Every statement goes over the simple-query protocol, so results arrive as
//! text regardless of column type and map straight onto a [`Snapshot`].
//!
//! Connection parameters come from the standard environment variables:
//! - PGHOST (default: localhost)
//! - PGPORT (default: 5432)
//! - PGUSER (default: $USER)
//! - PGPASSWORD (default: empty)
//! - PGDATABASE (default: same as PGUSER)
//! - PGSSLMODE (default: disable)
//!
//! Command-line flags override the environment.

use postgres::{Client, NoTls, SimpleQueryMessage};
use postgres_native_tls::MakeTlsConnector;
use thiserror::Error;
use tracing::{debug, info};

use crate::collector::traits::{Database, DbError};
use crate::snapshot::Snapshot;

/// Error type for connection settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PostgreSQL: {0} not set")]
    EnvNotSet(String),
    #[error("PostgreSQL: invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// TLS policy for the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// Plain TCP. `allow` and `prefer` also map here.
    #[default]
    Disable,
    /// TLS without certificate checks.
    Require,
    /// TLS with certificate and host name checks.
    VerifyFull,
}

impl std::str::FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" | "allow" | "prefer" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" | "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(ConfigError::Invalid {
                name: "PGSSLMODE",
                value: other.to_string(),
            }),
        }
    }
}

/// Connection flags shared by the binaries.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConnectionArgs {
    /// Database server host or socket directory (overrides PGHOST).
    #[arg(long)]
    pub host: Option<String>,

    /// Database server port (overrides PGPORT).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Database user name (overrides PGUSER).
    #[arg(short = 'U', long)]
    pub user: Option<String>,

    /// Database name (overrides PGDATABASE).
    #[arg(short, long)]
    pub dbname: Option<String>,
}

/// Resolved connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
    pub sslmode: SslMode,
}

impl ConnectionConfig {
    /// Reads `PG*` environment variables, using $USER if PGUSER is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let user = var("PGUSER")
            .or_else(|| var("USER"))
            .ok_or_else(|| ConfigError::EnvNotSet("PGUSER or USER".to_string()))?;

        let host = var("PGHOST").unwrap_or_else(|| "localhost".to_string());
        let port = match var("PGPORT") {
            Some(p) => p.parse().map_err(|_| ConfigError::Invalid {
                name: "PGPORT",
                value: p,
            })?,
            None => 5432,
        };
        let password = var("PGPASSWORD").filter(|p| !p.is_empty());
        let dbname = var("PGDATABASE").unwrap_or_else(|| user.clone());
        let sslmode = match var("PGSSLMODE") {
            Some(mode) => mode.parse()?,
            None => SslMode::default(),
        };

        Ok(Self {
            host,
            port,
            user,
            password,
            dbname,
            sslmode,
        })
    }

    /// Applies command-line overrides.
    pub fn with_args(mut self, args: &ConnectionArgs) -> Self {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(user) = &args.user {
            self.user = user.clone();
        }
        if let Some(dbname) = &args.dbname {
            self.dbname = dbname.clone();
        }
        self
    }

    /// libpq-style `key=value` connection string.
    pub fn connection_string(&self) -> String {
        let mut s = format!(
            "host={} port={} user={} dbname={} application_name=rpgtop",
            quote(&self.host),
            self.port,
            quote(&self.user),
            quote(&self.dbname)
        );
        if let Some(password) = &self.password {
            s.push_str(&format!(" password={}", quote(password)));
        }
        s
    }

    /// `true` when the server runs on this machine, so its OS metrics can be
    /// read from the local `/proc`.
    pub fn is_local(&self) -> bool {
        self.host.is_empty()
            || self.host.starts_with('/')
            || matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

/// Quotes a connection string value when it needs it.
fn quote(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\']) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// A live PostgreSQL session.
///
/// After a connectivity failure the client is dropped and every further
/// query fails with [`DbError::Connection`].
pub struct PostgresDb {
    client: Option<Client>,
    server_version_num: Option<i32>,
}

impl PostgresDb {
    pub fn connect(config: &ConnectionConfig) -> Result<Self, DbError> {
        let conn_str = config.connection_string();
        let client = match config.sslmode {
            SslMode::Disable => Client::connect(&conn_str, NoTls),
            mode => {
                let insecure = mode == SslMode::Require;
                let connector = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(insecure)
                    .danger_accept_invalid_hostnames(insecure)
                    .build()
                    .map_err(|e| DbError::Connection(format!("TLS setup failed: {}", e)))?;
                Client::connect(&conn_str, MakeTlsConnector::new(connector))
            }
        }
        .map_err(|e| DbError::Connection(format_postgres_error(&e)))?;

        let mut db = Self {
            client: Some(client),
            server_version_num: None,
        };

        // Determine server version once per connect.
        db.server_version_num = db
            .query("SHOW server_version_num")
            .ok()
            .and_then(|s| s.cell(0, 0).and_then(|v| v.parse().ok()));

        info!(
            "Connected to {}:{}/{} (server_version_num {:?})",
            config.host, config.port, config.dbname, db.server_version_num
        );
        Ok(db)
    }
}

impl Database for PostgresDb {
    fn query(&mut self, sql: &str) -> Result<Snapshot, DbError> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| DbError::Connection("connection closed".to_string()))?;

        match client.simple_query(sql) {
            Ok(messages) => Ok(snapshot_from_messages(messages)),
            Err(e) => {
                let msg = format_postgres_error(&e);
                if is_connection_error(&e) {
                    debug!("dropping PostgreSQL client: {}", msg);
                    self.client = None;
                    Err(DbError::Connection(msg))
                } else {
                    Err(DbError::Query(msg))
                }
            }
        }
    }

    fn server_version_num(&self) -> Option<i32> {
        self.server_version_num
    }
}

/// Collects the rows of a simple-query response.
///
/// Column names come from the row description so that an empty result still
/// carries its header.
fn snapshot_from_messages(messages: Vec<SimpleQueryMessage>) -> Snapshot {
    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::new();

    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(description) => {
                if columns.is_empty() {
                    columns = description.iter().map(|c| c.name().to_string()).collect();
                }
            }
            SimpleQueryMessage::Row(row) => {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                rows.push((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect());
            }
            _ => {}
        }
    }

    Snapshot::new(columns, rows)
}

/// Server errors below FATAL leave the session usable; everything else
/// (I/O failures, closed sockets, FATAL/PANIC) means it is gone.
fn is_connection_error(e: &postgres::Error) -> bool {
    if e.is_closed() {
        return true;
    }
    match e.as_db_error() {
        Some(db_error) => matches!(db_error.severity(), "FATAL" | "PANIC"),
        None => true,
    }
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_follow_libpq() {
        let config = ConnectionConfig::from_lookup(lookup(&[("USER", "alice")])).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "alice");
        assert_eq!(config.dbname, "alice");
        assert_eq!(config.password, None);
        assert_eq!(config.sslmode, SslMode::Disable);
    }

    #[test]
    fn pg_variables_win_over_user() {
        let config = ConnectionConfig::from_lookup(lookup(&[
            ("USER", "alice"),
            ("PGUSER", "postgres"),
            ("PGHOST", "db1"),
            ("PGPORT", "6432"),
            ("PGDATABASE", "app"),
            ("PGSSLMODE", "require"),
        ]))
        .unwrap();
        assert_eq!(config.user, "postgres");
        assert_eq!(config.host, "db1");
        assert_eq!(config.port, 6432);
        assert_eq!(config.dbname, "app");
        assert_eq!(config.sslmode, SslMode::Require);
    }

    #[test]
    fn missing_user_is_an_error() {
        let err = ConnectionConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvNotSet(_)));
    }

    #[test]
    fn bad_port_and_sslmode_are_rejected() {
        assert!(ConnectionConfig::from_lookup(lookup(&[("USER", "a"), ("PGPORT", "x")])).is_err());
        assert!(
            ConnectionConfig::from_lookup(lookup(&[("USER", "a"), ("PGSSLMODE", "always")]))
                .is_err()
        );
        assert_eq!("verify-ca".parse::<SslMode>().unwrap(), SslMode::VerifyFull);
        assert_eq!("prefer".parse::<SslMode>().unwrap(), SslMode::Disable);
    }

    #[test]
    fn flags_override_environment() {
        let config = ConnectionConfig::from_lookup(lookup(&[("USER", "alice")]))
            .unwrap()
            .with_args(&ConnectionArgs {
                host: Some("10.0.0.5".into()),
                port: Some(5433),
                user: None,
                dbname: Some("shop".into()),
            });
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 5433);
        assert_eq!(config.user, "alice");
        assert_eq!(config.dbname, "shop");
        assert!(!config.is_local());
    }

    #[test]
    fn connection_string_quotes_values() {
        let config = ConnectionConfig {
            host: "/var/run/postgresql".into(),
            port: 5432,
            user: "app".into(),
            password: Some("it's secret".into()),
            dbname: "my db".into(),
            sslmode: SslMode::Disable,
        };
        assert_eq!(
            config.connection_string(),
            "host=/var/run/postgresql port=5432 user=app dbname='my db' \
             application_name=rpgtop password='it\\'s secret'"
        );
        assert!(config.is_local());
    }
}
