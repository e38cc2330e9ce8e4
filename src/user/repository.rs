//! Handle database requests for the users table.

use sqlx::Row;

use crate::config::Schema;
use crate::credential::StoredCredential;
use crate::database::Database;
use crate::error::Result;
use crate::user::{NewUserRecord, UpdateUser, User};

// Bind positions are fixed by the query builders below.
const INSERT_PASSWD_PLACEHOLDER: &str = "$4";
const UPDATE_PASSWD_PLACEHOLDER: &str = "$10";

#[derive(Clone)]
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn schema(&self) -> &Schema {
        &self.db.schema
    }

    /// Insert a user, returning the generated (or supplied) row id.
    /// Literal credentials are bound as data; storage-side credentials
    /// splice their expression around the bound plaintext.
    pub async fn insert(
        &self,
        record: &NewUserRecord,
        credential: &StoredCredential,
    ) -> Result<i64> {
        let (fragment, bound) = credential.render(INSERT_PASSWD_PLACEHOLDER);
        let query = insert_query(self.schema(), &fragment);

        let row = self
            .db
            .bounded(
                sqlx::query(&query)
                    .bind(&record.login)
                    .bind(record.uid)
                    .bind(record.gid)
                    .bind(bound)
                    .bind(&record.homedir)
                    .bind(&record.shell)
                    .bind(&record.name)
                    .bind(&record.email)
                    .bind(&record.company)
                    .bind(&record.comment)
                    .bind(record.disabled)
                    .bind(record.created_at)
                    .fetch_one(&self.db.postgres),
            )
            .await?;

        Ok(row.try_get(0)?)
    }

    pub async fn by_login(&self, login: &str) -> Result<Option<User>> {
        let query = by_field_query(self.schema(), &self.schema().field_login);
        let row = self
            .db
            .bounded(
                sqlx::query(&query)
                    .bind(login)
                    .fetch_optional(&self.db.postgres),
            )
            .await?;

        row.map(|row| User::from_row(&row, self.schema()))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<User>> {
        let query = by_field_query(self.schema(), &self.schema().field_id);
        let row = self
            .db
            .bounded(
                sqlx::query(&query).bind(id).fetch_optional(&self.db.postgres),
            )
            .await?;

        row.map(|row| User::from_row(&row, self.schema()))
            .transpose()
            .map_err(Into::into)
    }

    /// Every user, ascending by row id.
    pub async fn list(&self) -> Result<Vec<User>> {
        let query = list_query(self.schema());
        let rows = self
            .db
            .bounded(sqlx::query(&query).fetch_all(&self.db.postgres))
            .await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            data.push(User::from_row(&row, self.schema())?);
        }
        Ok(data)
    }

    /// `(id, login)` of every user whose primary group is `gid`.
    pub async fn by_primary_group(
        &self,
        gid: i64,
    ) -> Result<Vec<(i64, String)>> {
        let query = by_primary_group_query(self.schema());
        let rows = self
            .db
            .bounded(
                sqlx::query(&query).bind(gid).fetch_all(&self.db.postgres),
            )
            .await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            data.push((
                row.try_get(self.schema().field_id.as_str())?,
                row.try_get(self.schema().field_login.as_str())?,
            ));
        }
        Ok(data)
    }

    /// Rewrite the profile fields of user `id`; the credential column
    /// only when one is supplied.
    pub async fn update(
        &self,
        id: i64,
        changes: &UpdateUser,
        credential: Option<&StoredCredential>,
    ) -> Result<bool> {
        let rendered = credential
            .map(|credential| credential.render(UPDATE_PASSWD_PLACEHOLDER));
        let query = update_query(
            self.schema(),
            rendered.as_ref().map(|(fragment, _)| fragment.as_str()),
        );

        let mut request = sqlx::query(&query)
            .bind(id)
            .bind(changes.gid)
            .bind(&changes.homedir)
            .bind(&changes.shell)
            .bind(&changes.name)
            .bind(&changes.email)
            .bind(&changes.company)
            .bind(&changes.comment)
            .bind(changes.disabled);
        if let Some((_, bound)) = rendered.as_ref() {
            request = request.bind(*bound);
        }

        let result = self
            .db
            .bounded(request.execute(&self.db.postgres))
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let query = delete_query(self.schema());
        let result = self
            .db
            .bounded(sqlx::query(&query).bind(id).execute(&self.db.postgres))
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of users, optionally only disabled ones.
    pub async fn count(&self, only_disabled: bool) -> Result<i64> {
        let query = count_query(self.schema(), only_disabled);
        let count = self
            .db
            .bounded(sqlx::query_scalar(&query).fetch_one(&self.db.postgres))
            .await?;
        Ok(count)
    }

    /// Highest stored uid, if any user exists.
    pub async fn last_uid(&self) -> Result<Option<i64>> {
        let query = last_uid_query(self.schema());
        let max = self
            .db
            .bounded(sqlx::query_scalar(&query).fetch_one(&self.db.postgres))
            .await?;
        Ok(max)
    }
}

fn insert_query(schema: &Schema, passwd_fragment: &str) -> String {
    format!(
        "INSERT INTO {table} ({login}, {uid}, {ugid}, {passwd}, {homedir}, {shell}, {name}, {email}, {company}, {comment}, {disabled}, {create_date}) \
         VALUES ($1, $2, $3, {passwd_fragment}, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {id}",
        table = schema.table_users,
        login = schema.field_login,
        uid = schema.field_uid,
        ugid = schema.field_ugid,
        passwd = schema.field_passwd,
        homedir = schema.field_homedir,
        shell = schema.field_shell,
        name = schema.field_name,
        email = schema.field_email,
        company = schema.field_company,
        comment = schema.field_comment,
        disabled = schema.field_disabled,
        create_date = schema.field_create_date,
        id = schema.field_id,
    )
}

fn by_field_query(schema: &Schema, field: &str) -> String {
    format!(
        "SELECT * FROM {table} WHERE {field} = $1",
        table = schema.table_users,
    )
}

fn list_query(schema: &Schema) -> String {
    format!(
        "SELECT * FROM {table} ORDER BY {id} ASC",
        table = schema.table_users,
        id = schema.field_id,
    )
}

fn by_primary_group_query(schema: &Schema) -> String {
    format!(
        "SELECT {id}, {login} FROM {table} WHERE {ugid} = $1 ORDER BY {id} ASC",
        id = schema.field_id,
        login = schema.field_login,
        table = schema.table_users,
        ugid = schema.field_ugid,
    )
}

fn update_query(schema: &Schema, passwd_fragment: Option<&str>) -> String {
    let passwd_clause = match passwd_fragment {
        Some(fragment) => {
            format!(", {passwd} = {fragment}", passwd = schema.field_passwd)
        },
        None => String::new(),
    };

    format!(
        "UPDATE {table} SET {ugid} = $2, {homedir} = $3, {shell} = $4, {name} = $5, {email} = $6, {company} = $7, {comment} = $8, {disabled} = $9{passwd_clause} WHERE {id} = $1",
        table = schema.table_users,
        ugid = schema.field_ugid,
        homedir = schema.field_homedir,
        shell = schema.field_shell,
        name = schema.field_name,
        email = schema.field_email,
        company = schema.field_company,
        comment = schema.field_comment,
        disabled = schema.field_disabled,
        id = schema.field_id,
    )
}

fn delete_query(schema: &Schema) -> String {
    format!(
        "DELETE FROM {table} WHERE {id} = $1",
        table = schema.table_users,
        id = schema.field_id,
    )
}

fn count_query(schema: &Schema, only_disabled: bool) -> String {
    let mut query =
        format!("SELECT COUNT(*) FROM {table}", table = schema.table_users);
    if only_disabled {
        query.push_str(&format!(
            " WHERE {disabled} = TRUE",
            disabled = schema.field_disabled
        ));
    }
    query
}

fn last_uid_query(schema: &Schema) -> String {
    format!(
        "SELECT MAX({uid}) FROM {table}",
        uid = schema.field_uid,
        table = schema.table_users,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_binds_literal_credential() {
        let credential = StoredCredential::Literal("cafe1234".into());
        let (fragment, bound) = credential.render(INSERT_PASSWD_PLACEHOLDER);
        let query = insert_query(&Schema::default(), &fragment);

        assert!(query.contains("VALUES ($1, $2, $3, $4, $5"));
        assert!(query.ends_with("RETURNING id"));
        assert_eq!(bound, "cafe1234");
    }

    #[test]
    fn test_insert_splices_storage_side_credential() {
        let credential = StoredCredential::Expression {
            template:
                "'{sha256}' || encode(digest({password}, 'sha256'), 'base64')"
                    .into(),
            plaintext: "longpassword".into(),
        };
        let (fragment, bound) = credential.render(INSERT_PASSWD_PLACEHOLDER);
        let query = insert_query(&Schema::default(), &fragment);

        assert!(query.contains(
            "VALUES ($1, $2, $3, '{sha256}' || encode(digest($4, 'sha256'), 'base64'), $5"
        ));
        assert_eq!(bound, "longpassword");
    }

    #[test]
    fn test_update_without_password_leaves_credential_column() {
        let query = update_query(&Schema::default(), None);
        assert!(!query.contains("passwd"));
        assert!(query.contains("SET gid = $2"));
        assert!(query.ends_with("WHERE id = $1"));
    }

    #[test]
    fn test_update_with_password_rewrites_credential_column() {
        let credential = StoredCredential::Expression {
            template: "md5({password})".into(),
            plaintext: "longpassword".into(),
        };
        let (fragment, _) = credential.render(UPDATE_PASSWD_PLACEHOLDER);
        let query = update_query(&Schema::default(), Some(&fragment));

        assert!(query.contains(", passwd = md5($10) WHERE id = $1"));
    }

    #[test]
    fn test_queries_use_mapped_names() {
        let schema = Schema {
            table_users: "accounts".into(),
            field_login: "ftpname".into(),
            field_ugid: "maingroup".into(),
            ..Default::default()
        };

        assert_eq!(
            by_primary_group_query(&schema),
            "SELECT id, ftpname FROM accounts WHERE maingroup = $1 ORDER BY id ASC"
        );
        assert_eq!(
            by_field_query(&schema, &schema.field_login),
            "SELECT * FROM accounts WHERE ftpname = $1"
        );
        assert_eq!(
            count_query(&schema, true),
            "SELECT COUNT(*) FROM accounts WHERE disabled = TRUE"
        );
        assert_eq!(
            last_uid_query(&schema),
            "SELECT MAX(uid) FROM accounts"
        );
    }
}
