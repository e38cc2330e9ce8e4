mod repository;

pub use repository::*;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::config::Schema;

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub uid: i64,
    /// Primary group id; referential only by convention, the schema
    /// carries no foreign key.
    pub gid: i64,
    #[serde(skip)]
    pub passwd: String,
    pub homedir: String,
    pub shell: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub comment: Option<String>,
    pub disabled: bool,
    pub created_at: NaiveDateTime,
}

impl User {
    /// Map a row using the configured column names. `sqlx::FromRow`
    /// cannot be derived here since the schema is remappable.
    pub(crate) fn from_row(
        row: &PgRow,
        schema: &Schema,
    ) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get(schema.field_id.as_str())?,
            login: row.try_get(schema.field_login.as_str())?,
            uid: row.try_get(schema.field_uid.as_str())?,
            gid: row.try_get(schema.field_ugid.as_str())?,
            passwd: row.try_get(schema.field_passwd.as_str())?,
            homedir: row.try_get(schema.field_homedir.as_str())?,
            shell: row.try_get(schema.field_shell.as_str())?,
            name: row.try_get(schema.field_name.as_str())?,
            email: row.try_get(schema.field_email.as_str())?,
            company: row.try_get(schema.field_company.as_str())?,
            comment: row.try_get(schema.field_comment.as_str())?,
            disabled: row.try_get(schema.field_disabled.as_str())?,
            created_at: row.try_get(schema.field_create_date.as_str())?,
        })
    }
}

/// Inbound creation request, untrusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub login: String,
    pub password: String,
    /// Primary group id.
    pub gid: i64,
    /// Explicit uid; configuration default applies when absent.
    #[serde(default)]
    pub uid: Option<i64>,
    /// Supplementary groups to link after the insert.
    #[serde(default)]
    pub supplementary_gids: Vec<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Inbound update request. Profile fields are always rewritten; the
/// credential only when a new password is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUser {
    #[serde(default)]
    pub password: Option<String>,
    pub gid: i64,
    pub homedir: String,
    pub shell: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Fully-resolved record handed to the repository: defaults applied,
/// home path composed, credential hashed separately.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUserRecord {
    pub login: String,
    pub uid: i64,
    pub gid: i64,
    pub homedir: String,
    pub shell: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub comment: Option<String>,
    pub disabled: bool,
    pub created_at: NaiveDateTime,
}
