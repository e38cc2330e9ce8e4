//! Provisioning orchestration: validate, hash, write, link.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use rand::rngs::OsRng;
use serde::Serialize;
use validator::{ValidationError, ValidationErrors};

use crate::config::Configuration;
use crate::credential::CredentialHasher;
use crate::database::{Database, Table, Value};
use crate::error::{Result, ServerError};
use crate::group::{CreateGroup, Group, GroupRepository};
use crate::membership;
use crate::user::{CreateUser, NewUserRecord, UpdateUser, UserRepository};
use crate::validate::{Validator, is_valid_id};

const SUGGESTION_CHARSET: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Successful creation report. `warnings` carries non-fatal
/// supplementary-link failures; the account itself is committed.
#[derive(Debug, Clone, Serialize)]
pub struct Created {
    pub id: i64,
    pub login: String,
    pub warnings: Vec<String>,
}

/// Instance counters, mirroring the daemon admin front page.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub users: i64,
    pub disabled_users: i64,
    pub groups: i64,
    pub empty_groups: i64,
}

/// Orchestrates user and group lifecycle against the daemon tables.
#[derive(Clone)]
pub struct ProvisioningService {
    config: Arc<Configuration>,
    validator: Arc<Validator>,
    hasher: Arc<CredentialHasher>,
    pub users: UserRepository,
    pub groups: GroupRepository,
    db: Database,
}

impl ProvisioningService {
    /// Create a new [`ProvisioningService`]. Fails when the configured
    /// login expression or credential scheme is unusable.
    pub fn new(config: Arc<Configuration>, db: Database) -> Result<Self> {
        let validator = Arc::new(Validator::new(&config.provisioning)?);
        let hasher = Arc::new(CredentialHasher::new(
            &config.provisioning.passwd_encryption,
        )?);

        Ok(Self {
            validator,
            hasher,
            users: UserRepository::new(db.clone()),
            groups: GroupRepository::new(db.clone()),
            db,
            config,
        })
    }

    /// Create a user: validate, hash, insert, then link supplementary
    /// groups best-effort. Validation failures never reach storage;
    /// linking failures never roll the insert back.
    pub async fn create_user(&self, request: CreateUser) -> Result<Created> {
        let groups: BTreeMap<i64, String> =
            self.groups.list().await?.into_iter().collect();
        if groups.is_empty() {
            return Err(no_groups_error().into());
        }

        let uid = self.effective_uid(request.uid).await?;
        let login_taken = self
            .db
            .check_exists(
                Table::Users,
                &self.db.schema.field_login,
                Value::Text(&request.login),
            )
            .await?;

        let errors = self.validator.validate_new_user(
            &request,
            uid,
            &groups,
            login_taken,
        );
        if !errors.is_empty() {
            return Err(errors.into());
        }

        // Group presence was validated just above.
        let group_name = groups
            .get(&request.gid)
            .ok_or(ServerError::NotFound)?
            .clone();
        let credential =
            self.hasher.hash(&request.password, &request.login)?;
        let record = NewUserRecord {
            login: request.login.clone(),
            uid,
            gid: request.gid,
            homedir: self.homedir(&group_name, &request.login),
            shell: self.config.provisioning.default_shell.clone(),
            name: request.name.clone(),
            email: request.email.clone(),
            company: request.company.clone(),
            comment: request.comment.clone(),
            disabled: request.disabled,
            created_at: chrono::Utc::now().naive_utc(),
        };

        let id = match self.users.insert(&record, &credential).await {
            Ok(id) => id,
            // Two requests racing past the fast-path probe: the unique
            // constraint wins, report it like the probe would have.
            Err(ServerError::Sql(err)) if is_unique_violation(&err) => {
                tracing::warn!(
                    login = record.login,
                    "login collided with a concurrent insert"
                );
                let mut errors = ValidationErrors::new();
                errors.add(
                    "login",
                    ValidationError::new("login_taken").with_message(
                        "User name already exists; name must be unique."
                            .into(),
                    ),
                );
                return Err(errors.into());
            },
            Err(err) => {
                tracing::error!(
                    login = record.login,
                    error = %err,
                    "user creation failed"
                );
                return Err(err);
            },
        };

        let warnings = self
            .link_supplementary(&request.login, &request.supplementary_gids)
            .await;

        tracing::info!(login = record.login, id, "user created");
        Ok(Created {
            id,
            login: request.login,
            warnings,
        })
    }

    /// Link `login` into each supplementary group, accumulating
    /// non-fatal warnings instead of failing the whole creation.
    async fn link_supplementary(
        &self,
        login: &str,
        gids: &[i64],
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        for &gid in gids {
            if !is_valid_id(gid) {
                warnings.push(format!(
                    "Adding additional group failed; GID {gid} is not a positive integer."
                ));
                continue;
            }
            match self.groups.add_member(login, gid).await {
                Ok(true) => {},
                Ok(false) => warnings.push(format!(
                    "Adding additional group failed; GID {gid} cannot be found in the database."
                )),
                Err(err) => {
                    tracing::warn!(
                        login,
                        gid,
                        error = %err,
                        "supplementary group linking failed"
                    );
                    warnings.push(format!(
                        "Adding additional group failed; GID {gid} could not be updated."
                    ));
                },
            }
        }
        warnings
    }

    /// Rewrite a user's profile; re-hash the credential only when a new
    /// password is supplied.
    pub async fn update_user(
        &self,
        id: i64,
        changes: UpdateUser,
    ) -> Result<()> {
        let user =
            self.users.by_id(id).await?.ok_or(ServerError::NotFound)?;

        let credential = match changes.password.as_deref() {
            Some(password) => {
                let errors = self.validator.validate_password(password);
                if !errors.is_empty() {
                    return Err(errors.into());
                }
                Some(self.hasher.hash(password, &user.login)?)
            },
            None => None,
        };

        if !self
            .users
            .update(id, &changes, credential.as_ref())
            .await?
        {
            return Err(ServerError::NotFound);
        }

        tracing::info!(login = user.login, id, "user updated");
        Ok(())
    }

    /// Delete a user and sweep its login out of every members column.
    /// The sweep is best-effort: the row is already gone, leftovers are
    /// reported as warnings.
    pub async fn remove_user(&self, id: i64) -> Result<Vec<String>> {
        let user =
            self.users.by_id(id).await?.ok_or(ServerError::NotFound)?;

        if !self.users.delete(id).await? {
            return Err(ServerError::NotFound);
        }

        let mut warnings = Vec::new();
        match self.groups.list_full().await {
            Ok(groups) => {
                for group in groups {
                    if !membership::contains(&group.members, &user.login) {
                        continue;
                    }
                    if let Err(err) = self
                        .groups
                        .remove_member(&user.login, group.gid)
                        .await
                    {
                        tracing::warn!(
                            login = user.login.as_str(),
                            gid = group.gid,
                            error = %err,
                            "membership cleanup failed"
                        );
                        warnings.push(format!(
                            "Removing from group {} failed; members list still references the user.",
                            group.gid
                        ));
                    }
                }
            },
            Err(err) => {
                tracing::warn!(
                    login = user.login.as_str(),
                    error = %err,
                    "membership cleanup failed"
                );
                warnings.push(
                    "Removing group memberships failed; members lists may still reference the user."
                        .into(),
                );
            },
        }

        tracing::info!(login = user.login, id, "user removed");
        Ok(warnings)
    }

    /// Create a group with normalized members.
    pub async fn create_group(&self, request: CreateGroup) -> Result<i64> {
        let name_taken = self
            .db
            .check_exists(
                Table::Groups,
                &self.db.schema.field_groupname,
                Value::Text(&request.name),
            )
            .await?;
        let gid_taken = self
            .db
            .check_exists(
                Table::Groups,
                &self.db.schema.field_gid,
                Value::Int(request.gid),
            )
            .await?;

        let errors = self
            .validator
            .validate_new_group(&request, name_taken, gid_taken);
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let group = Group {
            gid: request.gid,
            name: request.name,
            members: membership::normalize(&request.members),
        };
        let gid = self.groups.insert(&group).await?;

        tracing::info!(group = group.name, gid, "group created");
        Ok(gid)
    }

    /// Renumber a group and every user referencing it as primary.
    pub async fn renumber_group(&self, old: i64, new: i64) -> Result<()> {
        if !is_valid_id(new) {
            let mut errors = ValidationErrors::new();
            errors.add(
                "gid",
                ValidationError::new("invalid_gid").with_message(
                    "Invalid GID; GID must be a positive integer.".into(),
                ),
            );
            return Err(errors.into());
        }
        if self.groups.by_gid(old).await?.is_none() {
            return Err(ServerError::NotFound);
        }
        if new != old
            && self
                .db
                .check_exists(
                    Table::Groups,
                    &self.db.schema.field_gid,
                    Value::Int(new),
                )
                .await?
        {
            let mut errors = ValidationErrors::new();
            errors.add(
                "gid",
                ValidationError::new("gid_taken").with_message(
                    "GID already exists; GID must be unique.".into(),
                ),
            );
            return Err(errors.into());
        }

        self.groups.update_gid(old, new).await?;
        tracing::info!(old, new, "group renumbered");
        Ok(())
    }

    /// Delete the group row. Users keep their primary gid even when it
    /// now points at nothing; the daemon tolerates the orphan.
    pub async fn delete_group(&self, gid: i64) -> Result<()> {
        if !self.groups.delete(gid).await? {
            return Err(ServerError::NotFound);
        }
        tracing::info!(gid, "group deleted");
        Ok(())
    }

    /// Add `login` to a group's members column.
    pub async fn add_member(&self, login: &str, gid: i64) -> Result<()> {
        if self.users.by_login(login).await?.is_none() {
            return Err(ServerError::NotFound);
        }
        if !self.groups.add_member(login, gid).await? {
            return Err(ServerError::NotFound);
        }
        Ok(())
    }

    /// Remove `login` from a group's members column.
    pub async fn remove_member(&self, login: &str, gid: i64) -> Result<()> {
        if !self.groups.remove_member(login, gid).await? {
            return Err(ServerError::NotFound);
        }
        Ok(())
    }

    /// Instance counters.
    pub async fn status(&self) -> Result<Status> {
        Ok(Status {
            users: self.users.count(false).await?,
            disabled_users: self.users.count(true).await?,
            groups: self.groups.count(false).await?,
            empty_groups: self.groups.count(true).await?,
        })
    }

    /// Effective uid for a new account: explicit value, configured
    /// default, or highest stored uid plus one.
    async fn effective_uid(&self, requested: Option<i64>) -> Result<i64> {
        if let Some(uid) =
            requested.or(self.config.provisioning.default_uid)
        {
            return Ok(uid);
        }
        Ok(self.users.last_uid().await?.unwrap_or(0) + 1)
    }

    fn homedir(&self, group_name: &str, login: &str) -> String {
        compose_homedir(
            &self.config.provisioning.default_homedir,
            group_name,
            login,
        )
    }

    /// Random password of the configured suggestion length.
    pub fn suggest_password(&self) -> String {
        suggest_password(self.config.provisioning.default_passwd_length)
    }

    /// Defaults the admin form is seeded with.
    pub async fn defaults(&self) -> Result<NewUserDefaults> {
        Ok(NewUserDefaults {
            uid: self.effective_uid(None).await?,
            password: self.suggest_password(),
            homedir: self.config.provisioning.default_homedir.clone(),
            shell: self.config.provisioning.default_shell.clone(),
        })
    }
}

/// Prefill values for a new account.
#[derive(Debug, Clone, Serialize)]
pub struct NewUserDefaults {
    pub uid: i64,
    pub password: String,
    pub homedir: String,
    pub shell: String,
}

/// Home path layout: `<base>/<group>/<login>`.
fn compose_homedir(base: &str, group_name: &str, login: &str) -> String {
    format!("{}/{group_name}/{login}", base.trim_end_matches('/'))
}

/// Random alphanumeric password drawn from the system entropy pool.
fn suggest_password(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| {
            SUGGESTION_CHARSET[rng.gen_range(0..SUGGESTION_CHARSET.len())]
                as char
        })
        .collect()
}

fn no_groups_error() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "gid",
        ValidationError::new("no_groups").with_message(
            "There are no groups in the database; please create at least one group before creating users."
                .into(),
        ),
    );
    errors
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_homedir_layout() {
        assert_eq!(
            compose_homedir("/home/ftp", "eng", "al-ice"),
            "/home/ftp/eng/al-ice"
        );
        // a trailing slash on the base must not double up.
        assert_eq!(
            compose_homedir("/srv/ftp/", "eng", "al-ice"),
            "/srv/ftp/eng/al-ice"
        );
    }

    #[test]
    fn test_suggested_password_shape() {
        let password = suggest_password(10);
        assert_eq!(password.len(), 10);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

        assert_eq!(SUGGESTION_CHARSET.len(), 62);
    }

    #[test]
    fn test_no_groups_error_message() {
        let errors = no_groups_error();
        assert!(
            crate::error::join_messages(&errors)
                .contains("There are no groups in the database")
        );
    }
}
