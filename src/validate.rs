//! Accumulating request validation.
//!
//! Every check runs, every violation is collected; the caller decides
//! how to display the set. Messages mirror what FTP admins have seen
//! for years, down to punctuation.

use std::collections::BTreeMap;

use regex_lite::Regex;
use validator::{ValidationError, ValidationErrors};

use crate::config::{Provisioning, UNBOUNDED};
use crate::error::ServerError;
use crate::group::CreateGroup;
use crate::user::CreateUser;

/// Positive integer check shared by every id-shaped input.
pub fn is_valid_id(id: i64) -> bool {
    id > 0
}

pub struct Validator {
    policy: Provisioning,
    userid_regex: Regex,
}

impl Validator {
    /// Create a new [`Validator`], compiling the configured login
    /// expression once.
    pub fn new(policy: &Provisioning) -> Result<Self, ServerError> {
        let userid_regex = Regex::new(&policy.userid_regex).map_err(|err| {
            ServerError::Config(format!(
                "`userid_regex` does not compile: {err}"
            ))
        })?;

        Ok(Self {
            policy: policy.clone(),
            userid_regex,
        })
    }

    /// Validate a creation request against the configured policy and
    /// the current state of the database (group list, login probe).
    /// `uid` is the effective uid after defaults were applied.
    pub fn validate_new_user(
        &self,
        input: &CreateUser,
        uid: i64,
        existing_groups: &BTreeMap<i64, String>,
        login_taken: bool,
    ) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if input.login.is_empty()
            || !self.userid_regex.is_match(&input.login)
            || input.login.len() > self.policy.max_userid_length
        {
            errors.add(
                "login",
                ValidationError::new("invalid_login").with_message(
                    format!(
                        "Invalid user name; user name must contain only letters, numbers, hyphens, and underscores with a maximum of {} characters.",
                        self.policy.max_userid_length
                    )
                    .into(),
                ),
            );
        }

        if !is_valid_id(uid) {
            errors.add(
                "uid",
                ValidationError::new("invalid_uid").with_message(
                    "Invalid UID; UID must be a positive integer.".into(),
                ),
            );
        }
        let (min_uid, max_uid) = (self.policy.min_uid, self.policy.max_uid);
        if max_uid != UNBOUNDED && min_uid != UNBOUNDED {
            if uid > max_uid || uid < min_uid {
                errors.add(
                    "uid",
                    ValidationError::new("uid_out_of_range").with_message(
                        format!(
                            "Invalid UID; UID must be between {min_uid} and {max_uid}."
                        )
                        .into(),
                    ),
                );
            }
        } else if max_uid != UNBOUNDED && uid > max_uid {
            errors.add(
                "uid",
                ValidationError::new("uid_out_of_range").with_message(
                    format!("Invalid UID; UID must be at most {max_uid}.")
                        .into(),
                ),
            );
        } else if min_uid != UNBOUNDED && uid < min_uid {
            errors.add(
                "uid",
                ValidationError::new("uid_out_of_range").with_message(
                    format!("Invalid UID; UID must be at least {min_uid}.")
                        .into(),
                ),
            );
        }

        if !is_valid_id(input.gid) {
            errors.add(
                "gid",
                ValidationError::new("invalid_gid").with_message(
                    "Invalid main group; GID must be a positive integer."
                        .into(),
                ),
            );
        }
        if !existing_groups.contains_key(&input.gid) {
            errors.add(
                "gid",
                ValidationError::new("unknown_gid").with_message(
                    "Main group does not exist; GID cannot be found in the database."
                        .into(),
                ),
            );
        }

        self.check_password_length(&input.password, &mut errors);

        // Configuration-level check: a blank shell would end up on
        // every created account.
        if self.policy.default_shell.is_empty() {
            errors.add(
                "shell",
                ValidationError::new("invalid_shell").with_message(
                    "Invalid shell; shell cannot be empty.".into(),
                ),
            );
        }

        if login_taken {
            errors.add(
                "login",
                ValidationError::new("login_taken").with_message(
                    "User name already exists; name must be unique.".into(),
                ),
            );
        }

        errors
    }

    /// Validate a replacement password on its own, for updates.
    pub fn validate_password(&self, password: &str) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        self.check_password_length(password, &mut errors);
        errors
    }

    fn check_password_length(
        &self,
        password: &str,
        errors: &mut ValidationErrors,
    ) {
        if password.len() < self.policy.min_passwd_length {
            errors.add(
                "password",
                ValidationError::new("password_too_short").with_message(
                    format!(
                        "Password is too short; minimum length is {} characters.",
                        self.policy.min_passwd_length
                    )
                    .into(),
                ),
            );
        }
    }

    /// Validate a group creation request.
    pub fn validate_new_group(
        &self,
        input: &CreateGroup,
        name_taken: bool,
        gid_taken: bool,
    ) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if input.name.is_empty() {
            errors.add(
                "name",
                ValidationError::new("invalid_group_name").with_message(
                    "Invalid group name; group name cannot be empty.".into(),
                ),
            );
        }
        if name_taken {
            errors.add(
                "name",
                ValidationError::new("group_name_taken").with_message(
                    "Group name already exists; name must be unique.".into(),
                ),
            );
        }

        if !is_valid_id(input.gid) {
            errors.add(
                "gid",
                ValidationError::new("invalid_gid").with_message(
                    "Invalid GID; GID must be a positive integer.".into(),
                ),
            );
        }
        if gid_taken {
            errors.add(
                "gid",
                ValidationError::new("gid_taken").with_message(
                    "GID already exists; GID must be unique.".into(),
                ),
            );
        }

        for login in input.members.iter().filter(|login| !login.is_empty()) {
            if !self.userid_regex.is_match(login) {
                errors.add(
                    "members",
                    ValidationError::new("invalid_member").with_message(
                        format!(
                            "Invalid member \"{login}\"; member names must use the user name format."
                        )
                        .into(),
                    ),
                );
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::join_messages;

    fn policy() -> Provisioning {
        Provisioning {
            max_userid_length: 16,
            default_uid: Some(2000),
            min_uid: 2000,
            max_uid: 2999,
            min_passwd_length: 8,
            ..Default::default()
        }
    }

    fn groups() -> BTreeMap<i64, String> {
        BTreeMap::from([(10, "eng".to_string())])
    }

    fn request() -> CreateUser {
        CreateUser {
            login: "al-ice".into(),
            password: "longpassword".into(),
            gid: 10,
            uid: None,
            supplementary_gids: vec![],
            name: None,
            email: None,
            company: None,
            comment: None,
            disabled: false,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        let validator = Validator::new(&policy()).unwrap();
        let errors =
            validator.validate_new_user(&request(), 2000, &groups(), false);
        assert!(errors.is_empty(), "unexpected: {errors:?}");
    }

    #[test]
    fn test_login_format_rejected_with_message() {
        let validator = Validator::new(&policy()).unwrap();
        let mut input = request();
        input.login = "bad name!".into();

        let errors =
            validator.validate_new_user(&input, 2000, &groups(), false);
        assert!(join_messages(&errors).contains(
            "Invalid user name; user name must contain only letters"
        ));
    }

    #[test]
    fn test_login_length_bound() {
        let validator = Validator::new(&policy()).unwrap();
        let mut input = request();
        input.login = "a".repeat(17);

        let errors =
            validator.validate_new_user(&input, 2000, &groups(), false);
        assert!(!errors.is_empty());

        input.login = "a".repeat(16);
        let errors =
            validator.validate_new_user(&input, 2000, &groups(), false);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_uid_bounds() {
        let validator = Validator::new(&policy()).unwrap();

        let errors =
            validator.validate_new_user(&request(), 3000, &groups(), false);
        assert!(
            join_messages(&errors)
                .contains("UID must be between 2000 and 2999.")
        );

        // only an upper bound configured.
        let mut one_sided = policy();
        one_sided.min_uid = UNBOUNDED;
        let validator = Validator::new(&one_sided).unwrap();
        let errors =
            validator.validate_new_user(&request(), 3000, &groups(), false);
        assert!(join_messages(&errors).contains("UID must be at most 2999."));

        // only a lower bound configured.
        let mut one_sided = policy();
        one_sided.max_uid = UNBOUNDED;
        let validator = Validator::new(&one_sided).unwrap();
        let errors =
            validator.validate_new_user(&request(), 1999, &groups(), false);
        assert!(
            join_messages(&errors).contains("UID must be at least 2000.")
        );
    }

    #[test]
    fn test_nonpositive_uid() {
        let mut unbounded = policy();
        unbounded.min_uid = UNBOUNDED;
        unbounded.max_uid = UNBOUNDED;
        let validator = Validator::new(&unbounded).unwrap();

        let errors =
            validator.validate_new_user(&request(), 0, &groups(), false);
        assert!(
            join_messages(&errors)
                .contains("Invalid UID; UID must be a positive integer.")
        );
    }

    #[test]
    fn test_unknown_primary_group() {
        let validator = Validator::new(&policy()).unwrap();
        let mut input = request();
        input.gid = 99;

        let errors =
            validator.validate_new_user(&input, 2000, &groups(), false);
        assert!(join_messages(&errors).contains("Main group does not exist"));
    }

    #[test]
    fn test_short_password() {
        let validator = Validator::new(&policy()).unwrap();
        let mut input = request();
        input.password = "short".into();

        let errors =
            validator.validate_new_user(&input, 2000, &groups(), false);
        assert!(join_messages(&errors).contains(
            "Password is too short; minimum length is 8 characters."
        ));
    }

    #[test]
    fn test_blank_shell_configuration() {
        let mut broken = policy();
        broken.default_shell = String::new();
        let validator = Validator::new(&broken).unwrap();

        let errors =
            validator.validate_new_user(&request(), 2000, &groups(), false);
        assert!(
            join_messages(&errors)
                .contains("Invalid shell; shell cannot be empty.")
        );
    }

    #[test]
    fn test_taken_login_is_a_validation_error() {
        let validator = Validator::new(&policy()).unwrap();
        let errors =
            validator.validate_new_user(&request(), 2000, &groups(), true);
        assert!(join_messages(&errors).contains(
            "User name already exists; name must be unique."
        ));
    }

    #[test]
    fn test_all_violations_reported_together() {
        let validator = Validator::new(&policy()).unwrap();
        let mut input = request();
        input.login = "bad name!".into();
        input.password = "pw".into();
        input.gid = -4;

        let errors =
            validator.validate_new_user(&input, 5000, &groups(), true);
        let joined = join_messages(&errors);
        // login format + taken, uid range, gid invalid + unknown, password.
        assert_eq!(joined.lines().count(), 6);
    }

    #[test]
    fn test_group_validation() {
        let validator = Validator::new(&policy()).unwrap();

        let input = CreateGroup {
            name: String::new(),
            gid: 0,
            members: vec!["ok-name".into(), "bad name!".into()],
        };
        let joined =
            join_messages(&validator.validate_new_group(&input, true, true));
        assert!(joined.contains("group name cannot be empty"));
        assert!(joined.contains("Group name already exists"));
        assert!(joined.contains("GID must be a positive integer."));
        assert!(joined.contains("GID already exists"));
        assert!(joined.contains("Invalid member \"bad name!\""));

        let good = CreateGroup {
            name: "eng".into(),
            gid: 10,
            members: vec![],
        };
        assert!(
            validator.validate_new_group(&good, false, false).is_empty()
        );
    }

    #[test]
    fn test_is_valid_id() {
        assert!(is_valid_id(1));
        assert!(!is_valid_id(0));
        assert!(!is_valid_id(-7));
    }
}
