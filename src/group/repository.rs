//! Handle database requests for the groups table, including the
//! membership-list protocol.

use std::collections::BTreeMap;

use sqlx::Row;

use crate::config::Schema;
use crate::database::Database;
use crate::error::Result;
use crate::group::Group;
use crate::membership;

#[derive(Clone)]
pub struct GroupRepository {
    db: Database,
}

impl GroupRepository {
    /// Create a new [`GroupRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn schema(&self) -> &Schema {
        &self.db.schema
    }

    /// Every group as `(gid, name)`, ascending by gid.
    pub async fn list(&self) -> Result<Vec<(i64, String)>> {
        let query = list_query(self.schema());
        let rows = self
            .db
            .bounded(sqlx::query(&query).fetch_all(&self.db.postgres))
            .await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            data.push((
                row.try_get(self.schema().field_gid.as_str())?,
                row.try_get(self.schema().field_groupname.as_str())?,
            ));
        }
        Ok(data)
    }

    /// Every group with its raw members column, ascending by gid.
    pub async fn list_full(&self) -> Result<Vec<Group>> {
        let query = list_full_query(self.schema());
        let rows = self
            .db
            .bounded(sqlx::query(&query).fetch_all(&self.db.postgres))
            .await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            data.push(Group::from_row(&row, self.schema())?);
        }
        Ok(data)
    }

    pub async fn by_gid(&self, gid: i64) -> Result<Option<Group>> {
        let query = by_gid_query(self.schema());
        let row = self
            .db
            .bounded(
                sqlx::query(&query).bind(gid).fetch_optional(&self.db.postgres),
            )
            .await?;

        row.map(|row| Group::from_row(&row, self.schema()))
            .transpose()
            .map_err(Into::into)
    }

    /// Insert a group, returning its gid.
    pub async fn insert(&self, group: &Group) -> Result<i64> {
        let query = insert_query(self.schema());
        let row = self
            .db
            .bounded(
                sqlx::query(&query)
                    .bind(&group.name)
                    .bind(group.gid)
                    .bind(&group.members)
                    .fetch_one(&self.db.postgres),
            )
            .await?;

        Ok(row.try_get(0)?)
    }

    /// Renumber a group: the group row and every user row whose primary
    /// group is `old` move to `new`, atomically.
    pub async fn update_gid(&self, old: i64, new: i64) -> Result<()> {
        let users = renumber_users_query(self.schema());
        let groups = renumber_group_query(self.schema());
        let pool = self.db.postgres.clone();

        self.db
            .bounded(async move {
                let mut tx = pool.begin().await?;
                sqlx::query(&users)
                    .bind(new)
                    .bind(old)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(&groups)
                    .bind(new)
                    .bind(old)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(())
            })
            .await
    }

    /// Delete the group row only. Users referencing the gid keep their
    /// now-orphaned primary group, as the daemon tolerates it.
    pub async fn delete(&self, gid: i64) -> Result<bool> {
        let query = delete_query(self.schema());
        let result = self
            .db
            .bounded(sqlx::query(&query).bind(gid).execute(&self.db.postgres))
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add `login` to the group's members column. Idempotent; the
    /// read-modify-write runs under a row lock so concurrent calls
    /// cannot lose an update. Returns `false` when the group is
    /// missing.
    pub async fn add_member(&self, login: &str, gid: i64) -> Result<bool> {
        self.mutate_members(gid, |members| {
            if membership::contains(members, login) {
                None
            } else {
                Some(membership::add(members, login))
            }
        })
        .await
    }

    /// Remove the exact `login` token from the group's members column.
    /// Returns `false` when the group is missing.
    pub async fn remove_member(&self, login: &str, gid: i64) -> Result<bool> {
        self.mutate_members(gid, |members| {
            if membership::contains(members, login) {
                Some(membership::remove(members, login))
            } else {
                None
            }
        })
        .await
    }

    async fn mutate_members<F>(&self, gid: i64, mutate: F) -> Result<bool>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let select = members_for_update_query(self.schema());
        let update = update_members_query(self.schema());
        let pool = self.db.postgres.clone();

        self.db
            .bounded(async move {
                let mut tx = pool.begin().await?;
                let Some(row) = sqlx::query(&select)
                    .bind(gid)
                    .fetch_optional(&mut *tx)
                    .await?
                else {
                    return Ok(false);
                };

                let members: String = row.try_get(0)?;
                if let Some(updated) = mutate(&members) {
                    sqlx::query(&update)
                        .bind(updated)
                        .bind(gid)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
                Ok(true)
            })
            .await
    }

    /// Supplementary memberships of `login`, derived by tokenizing
    /// every members column: `gid -> group name`.
    pub async fn groups_of(
        &self,
        login: &str,
    ) -> Result<BTreeMap<i64, String>> {
        let groups = self.list_full().await?;

        Ok(groups
            .into_iter()
            .filter(|group| membership::contains(&group.members, login))
            .map(|group| (group.gid, group.name))
            .collect())
    }

    /// Number of groups, optionally only those with no members.
    pub async fn count(&self, only_empty: bool) -> Result<i64> {
        let query = count_query(self.schema(), only_empty);
        let count = self
            .db
            .bounded(sqlx::query_scalar(&query).fetch_one(&self.db.postgres))
            .await?;
        Ok(count)
    }

    /// Highest stored gid, if any group exists.
    pub async fn last_gid(&self) -> Result<Option<i64>> {
        let query = last_gid_query(self.schema());
        let max = self
            .db
            .bounded(sqlx::query_scalar(&query).fetch_one(&self.db.postgres))
            .await?;
        Ok(max)
    }
}

fn list_query(schema: &Schema) -> String {
    format!(
        "SELECT {gid}, {name} FROM {table} ORDER BY {gid} ASC",
        gid = schema.field_gid,
        name = schema.field_groupname,
        table = schema.table_groups,
    )
}

fn list_full_query(schema: &Schema) -> String {
    format!(
        "SELECT * FROM {table} ORDER BY {gid} ASC",
        table = schema.table_groups,
        gid = schema.field_gid,
    )
}

fn by_gid_query(schema: &Schema) -> String {
    format!(
        "SELECT * FROM {table} WHERE {gid} = $1",
        table = schema.table_groups,
        gid = schema.field_gid,
    )
}

fn insert_query(schema: &Schema) -> String {
    format!(
        "INSERT INTO {table} ({name}, {gid}, {members}) VALUES ($1, $2, $3) RETURNING {gid}",
        table = schema.table_groups,
        name = schema.field_groupname,
        gid = schema.field_gid,
        members = schema.field_members,
    )
}

fn renumber_users_query(schema: &Schema) -> String {
    format!(
        "UPDATE {table} SET {ugid} = $1 WHERE {ugid} = $2",
        table = schema.table_users,
        ugid = schema.field_ugid,
    )
}

fn renumber_group_query(schema: &Schema) -> String {
    format!(
        "UPDATE {table} SET {gid} = $1 WHERE {gid} = $2",
        table = schema.table_groups,
        gid = schema.field_gid,
    )
}

fn delete_query(schema: &Schema) -> String {
    format!(
        "DELETE FROM {table} WHERE {gid} = $1",
        table = schema.table_groups,
        gid = schema.field_gid,
    )
}

fn members_for_update_query(schema: &Schema) -> String {
    format!(
        "SELECT {members} FROM {table} WHERE {gid} = $1 FOR UPDATE",
        members = schema.field_members,
        table = schema.table_groups,
        gid = schema.field_gid,
    )
}

fn update_members_query(schema: &Schema) -> String {
    format!(
        "UPDATE {table} SET {members} = $1 WHERE {gid} = $2",
        table = schema.table_groups,
        members = schema.field_members,
        gid = schema.field_gid,
    )
}

fn count_query(schema: &Schema, only_empty: bool) -> String {
    let mut query = format!(
        "SELECT COUNT(*) FROM {table}",
        table = schema.table_groups
    );
    if only_empty {
        query.push_str(&format!(
            " WHERE {members} = ''",
            members = schema.field_members
        ));
    }
    query
}

fn last_gid_query(schema: &Schema) -> String {
    format!(
        "SELECT MAX({gid}) FROM {table}",
        gid = schema.field_gid,
        table = schema.table_groups,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_use_mapped_names() {
        let schema = Schema {
            table_groups: "grp".into(),
            field_gid: "gnum".into(),
            field_groupname: "gname".into(),
            field_members: "logins".into(),
            ..Default::default()
        };

        assert_eq!(
            list_query(&schema),
            "SELECT gnum, gname FROM grp ORDER BY gnum ASC"
        );
        assert_eq!(
            members_for_update_query(&schema),
            "SELECT logins FROM grp WHERE gnum = $1 FOR UPDATE"
        );
        assert_eq!(
            update_members_query(&schema),
            "UPDATE grp SET logins = $1 WHERE gnum = $2"
        );
    }

    #[test]
    fn test_renumber_touches_both_tables() {
        let schema = Schema::default();
        assert_eq!(
            renumber_users_query(&schema),
            "UPDATE ftpuser SET gid = $1 WHERE gid = $2"
        );
        assert_eq!(
            renumber_group_query(&schema),
            "UPDATE ftpgroup SET gid = $1 WHERE gid = $2"
        );
    }

    #[test]
    fn test_count_query_filters_empty_groups() {
        let schema = Schema::default();
        assert_eq!(
            count_query(&schema, false),
            "SELECT COUNT(*) FROM ftpgroup"
        );
        assert_eq!(
            count_query(&schema, true),
            "SELECT COUNT(*) FROM ftpgroup WHERE members = ''"
        );
    }
}
