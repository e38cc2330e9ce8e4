//! Configuration manager for ftpadmin.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ServerError;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sentinel meaning "no bound" for `min_uid`/`max_uid`, kept for parity
/// with the daemon-side configuration files.
pub const UNBOUNDED: i64 = -1;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Account provisioning policy.
    #[serde(default)]
    pub provisioning: Provisioning,
    /// Table and field name mapping for the daemon schema.
    #[serde(default)]
    pub schema: Schema,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
    /// Upper bound, in seconds, applied to every storage call.
    pub statement_timeout_secs: Option<u64>,
    /// Apply the bundled migration on start. Leave unset when mapping
    /// onto a pre-existing daemon schema.
    #[serde(default)]
    pub migrate: bool,
}

/// Account provisioning policy: validation bounds, defaults and the
/// credential hashing scheme handed to new accounts.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Provisioning {
    /// Maximum accepted login length.
    pub max_userid_length: usize,
    /// Login names must match this expression.
    pub userid_regex: String,
    /// Numeric uid assigned to new accounts. When unset, the highest
    /// stored uid plus one is used.
    pub default_uid: Option<i64>,
    /// Lowest acceptable uid, `-1` for unbounded.
    pub min_uid: i64,
    /// Highest acceptable uid, `-1` for unbounded.
    pub max_uid: i64,
    /// Minimum password length.
    pub min_passwd_length: usize,
    /// Length of suggested passwords.
    pub default_passwd_length: usize,
    /// Base path under which home directories are created.
    pub default_homedir: String,
    /// Shell written on every new account.
    pub default_shell: String,
    /// Credential scheme: `pbkdf2`, `crypt`, `OpenSSL:<digest>` or the
    /// name of a single-argument SQL function.
    pub passwd_encryption: String,
}

impl Default for Provisioning {
    fn default() -> Self {
        Self {
            max_userid_length: 16,
            userid_regex: "^[A-Za-z0-9_-]+$".into(),
            default_uid: None,
            min_uid: UNBOUNDED,
            max_uid: UNBOUNDED,
            min_passwd_length: 8,
            default_passwd_length: 10,
            default_homedir: "/home/ftp".into(),
            default_shell: "/bin/false".into(),
            passwd_encryption: "pbkdf2".into(),
        }
    }
}

/// Names of the two daemon tables and their columns. Defaults follow
/// the ProFTPd `mod_sql` convention; deployments with renamed columns
/// override entries here instead of patching queries.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub table_users: String,
    pub table_groups: String,
    pub field_id: String,
    pub field_login: String,
    pub field_uid: String,
    pub field_ugid: String,
    pub field_passwd: String,
    pub field_homedir: String,
    pub field_shell: String,
    pub field_name: String,
    pub field_email: String,
    pub field_company: String,
    pub field_comment: String,
    pub field_disabled: String,
    pub field_create_date: String,
    pub field_groupname: String,
    pub field_gid: String,
    pub field_members: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            table_users: "ftpuser".into(),
            table_groups: "ftpgroup".into(),
            field_id: "id".into(),
            field_login: "userid".into(),
            field_uid: "uid".into(),
            field_ugid: "gid".into(),
            field_passwd: "passwd".into(),
            field_homedir: "homedir".into(),
            field_shell: "shell".into(),
            field_name: "name".into(),
            field_email: "email".into(),
            field_company: "company".into(),
            field_comment: "comment".into(),
            field_disabled: "disabled".into(),
            field_create_date: "create_date".into(),
            field_groupname: "groupname".into(),
            field_gid: "gid".into(),
            field_members: "members".into(),
        }
    }
}

impl Schema {
    fn entries(&self) -> [(&'static str, &str); 18] {
        [
            ("table_users", &self.table_users),
            ("table_groups", &self.table_groups),
            ("field_id", &self.field_id),
            ("field_login", &self.field_login),
            ("field_uid", &self.field_uid),
            ("field_ugid", &self.field_ugid),
            ("field_passwd", &self.field_passwd),
            ("field_homedir", &self.field_homedir),
            ("field_shell", &self.field_shell),
            ("field_name", &self.field_name),
            ("field_email", &self.field_email),
            ("field_company", &self.field_company),
            ("field_comment", &self.field_comment),
            ("field_disabled", &self.field_disabled),
            ("field_create_date", &self.field_create_date),
            ("field_groupname", &self.field_groupname),
            ("field_gid", &self.field_gid),
            ("field_members", &self.field_members),
        ]
    }

    /// Mapped names end up spliced into SQL text, so they are
    /// restricted to plain identifiers.
    pub fn validate(&self) -> Result<(), ServerError> {
        for (key, value) in self.entries() {
            if !is_identifier(value) {
                return Err(ServerError::Config(format!(
                    "`{key}` is not a valid SQL identifier: {value:?}"
                )));
            }
        }
        Ok(())
    }
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the
    /// default location.
    pub fn read(self) -> Result<Arc<Self>, ServerError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();

                config.schema.validate()?;

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_is_identifier_safe() {
        assert!(Schema::default().validate().is_ok());
    }

    #[test]
    fn test_schema_rejects_injection() {
        let schema = Schema {
            table_users: "ftpuser; DROP TABLE ftpuser".into(),
            ..Default::default()
        };
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_parse_yaml_overrides() {
        let raw = r#"
name: intra-ftp
postgres:
  address: localhost:5432
  database: proftpd
  statement_timeout_secs: 3
provisioning:
  max_userid_length: 16
  min_passwd_length: 8
  default_uid: 2000
  min_uid: 2000
  max_uid: 2999
  passwd_encryption: "OpenSSL:sha256"
schema:
  table_users: users
"#;
        let config: Configuration = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.name, "intra-ftp");
        assert_eq!(config.provisioning.default_uid, Some(2000));
        assert_eq!(config.provisioning.max_uid, 2999);
        assert_eq!(config.provisioning.passwd_encryption, "OpenSSL:sha256");
        // partial schema override keeps the remaining defaults.
        assert_eq!(config.schema.table_users, "users");
        assert_eq!(config.schema.table_groups, "ftpgroup");
        assert_eq!(
            config.postgres.as_ref().unwrap().statement_timeout_secs,
            Some(3)
        );
        assert!(!config.postgres.as_ref().unwrap().migrate);
    }

    #[test]
    fn test_unbounded_sentinel() {
        let provisioning = Provisioning::default();
        assert_eq!(provisioning.min_uid, UNBOUNDED);
        assert_eq!(provisioning.max_uid, UNBOUNDED);
    }
}
