mod repository;

pub use repository::*;

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::config::Schema;
use crate::membership;

/// Group as saved on database. `members` is the raw comma-separated
/// column the daemon reads; use [`Group::member_logins`] for the parsed
/// view.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Group {
    pub gid: i64,
    pub name: String,
    pub members: String,
}

impl Group {
    pub(crate) fn from_row(
        row: &PgRow,
        schema: &Schema,
    ) -> Result<Self, sqlx::Error> {
        Ok(Self {
            gid: row.try_get(schema.field_gid.as_str())?,
            name: row.try_get(schema.field_groupname.as_str())?,
            members: row.try_get(schema.field_members.as_str())?,
        })
    }

    /// Parsed membership tokens.
    pub fn member_logins(&self) -> Vec<&str> {
        membership::tokens(&self.members)
    }
}

/// Inbound group creation request, untrusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub gid: i64,
    /// Initial members; normalized before storage.
    #[serde(default)]
    pub members: Vec<String>,
}
