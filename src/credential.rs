//! Credential hashing for daemon accounts.
//!
//! The scheme is chosen by the `passwd_encryption` configuration entry
//! and decides whether the credential is computed here (a literal value
//! the repository binds like any other column) or by the storage layer
//! (a SQL expression the repository splices into the statement, with
//! the plaintext still passed as a bound parameter).

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

use crate::error::ServerError;

const PBKDF2_ROUNDS: u32 = 5000;
// `hash_pbkdf2(..., 40)` in the legacy tool counted hex characters:
// 20 derived bytes, hex-encoded to the 40-char column the daemon reads.
const PBKDF2_KEY_LENGTH: usize = 20;

const OPENSSL_PREFIX: &str = "OpenSSL:";

/// Marker replaced by the repository with the real `$n` placeholder.
pub const PASSWORD_SLOT: &str = "{password}";

/// Recognized credential schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    /// PBKDF2-HMAC-SHA1, 5000 rounds, login name as salt. The fixed,
    /// guessable salt is inherited from the daemon tooling this schema
    /// is shared with and kept for compatibility.
    Pbkdf2,
    /// Traditional Unix `crypt(3)` with a random two-character salt.
    Crypt,
    /// `{digest}base64` marker string computed by pgcrypto, e.g.
    /// `OpenSSL:sha256`.
    OpenSsl(String),
    /// Any other value names a single-argument SQL function applied to
    /// the plaintext, e.g. `md5`.
    SqlFunction(String),
}

impl Scheme {
    /// Parse the `passwd_encryption` configuration string.
    pub fn parse(raw: &str) -> Result<Self, ServerError> {
        if raw == "pbkdf2" {
            return Ok(Self::Pbkdf2);
        }
        if raw == "crypt" {
            return Ok(Self::Crypt);
        }
        if let Some(digest) = raw.strip_prefix(OPENSSL_PREFIX) {
            return Ok(Self::OpenSsl(checked_function_name(digest)?));
        }
        Ok(Self::SqlFunction(checked_function_name(raw)?))
    }
}

// Digest and function names are spliced into SQL text unescaped.
fn checked_function_name(name: &str) -> Result<String, ServerError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ServerError::Config(format!(
            "`passwd_encryption` names an invalid function: {name:?}"
        )));
    }
    Ok(name.to_owned())
}

/// A credential ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredCredential {
    /// Computed here; bound by the repository as literal data.
    Literal(String),
    /// Computed by the storage layer. `template` contains
    /// [`PASSWORD_SLOT`] where the bound plaintext parameter goes.
    Expression { template: String, plaintext: String },
}

impl StoredCredential {
    /// Resolve into the SQL fragment for the credential column and the
    /// value to bind at `placeholder`.
    pub fn render(&self, placeholder: &str) -> (String, &str) {
        match self {
            StoredCredential::Literal(value) => {
                (placeholder.to_owned(), value.as_str())
            },
            StoredCredential::Expression {
                template,
                plaintext,
            } => (
                template.replace(PASSWORD_SLOT, placeholder),
                plaintext.as_str(),
            ),
        }
    }
}

/// Applies the configured scheme to plaintext passwords.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    scheme: Scheme,
}

impl CredentialHasher {
    /// Create a new [`CredentialHasher`] from the configured scheme
    /// string.
    pub fn new(passwd_encryption: &str) -> Result<Self, ServerError> {
        Ok(Self {
            scheme: Scheme::parse(passwd_encryption)?,
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Hash `plaintext` for the account `login`.
    pub fn hash(
        &self,
        plaintext: &str,
        login: &str,
    ) -> Result<StoredCredential, ServerError> {
        match &self.scheme {
            Scheme::Pbkdf2 => {
                let mut derived = [0u8; PBKDF2_KEY_LENGTH];
                pbkdf2_hmac::<Sha1>(
                    plaintext.as_bytes(),
                    login.as_bytes(),
                    PBKDF2_ROUNDS,
                    &mut derived,
                );
                Ok(StoredCredential::Literal(hex::encode(derived)))
            },
            Scheme::Crypt => pwhash::unix_crypt::hash(plaintext)
                .map(StoredCredential::Literal)
                .map_err(|err| ServerError::Credential(err.to_string())),
            Scheme::OpenSsl(digest) => Ok(StoredCredential::Expression {
                template: format!(
                    "'{{{digest}}}' || encode(digest({slot}, '{digest}'), 'base64')",
                    slot = PASSWORD_SLOT,
                ),
                plaintext: plaintext.to_owned(),
            }),
            Scheme::SqlFunction(name) => Ok(StoredCredential::Expression {
                template: format!("{name}({slot})", slot = PASSWORD_SLOT),
                plaintext: plaintext.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recognized_forms() {
        assert_eq!(Scheme::parse("pbkdf2").unwrap(), Scheme::Pbkdf2);
        assert_eq!(Scheme::parse("crypt").unwrap(), Scheme::Crypt);
        assert_eq!(
            Scheme::parse("OpenSSL:sha256").unwrap(),
            Scheme::OpenSsl("sha256".into())
        );
        assert_eq!(
            Scheme::parse("md5").unwrap(),
            Scheme::SqlFunction("md5".into())
        );
    }

    #[test]
    fn test_parse_rejects_unsafe_function_names() {
        assert!(Scheme::parse("OpenSSL:sha256'); DROP").is_err());
        assert!(Scheme::parse("md5(").is_err());
        assert!(Scheme::parse("OpenSSL:").is_err());
    }

    #[test]
    fn test_pbkdf2_matches_legacy_shape() {
        let hasher = CredentialHasher::new("pbkdf2").unwrap();
        let StoredCredential::Literal(hash) =
            hasher.hash("longpassword", "al-ice").unwrap()
        else {
            panic!("pbkdf2 must be computed locally");
        };

        // 40 hex characters, exactly what the daemon column expects.
        assert_eq!(hash.len(), 40);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        // deterministic for the same login, login acts as the salt.
        let again = hasher.hash("longpassword", "al-ice").unwrap();
        assert_eq!(StoredCredential::Literal(hash.clone()), again);
        let other_login = hasher.hash("longpassword", "bob").unwrap();
        assert_ne!(StoredCredential::Literal(hash), other_login);
    }

    #[test]
    fn test_crypt_round_trips() {
        let hasher = CredentialHasher::new("crypt").unwrap();
        let StoredCredential::Literal(hash) =
            hasher.hash("longpassword", "al-ice").unwrap()
        else {
            panic!("crypt must be computed locally");
        };

        assert!(pwhash::unix::verify("longpassword", &hash));
        assert!(!pwhash::unix::verify("otherpassword", &hash));
    }

    #[test]
    fn test_openssl_scheme_is_storage_side() {
        let hasher = CredentialHasher::new("OpenSSL:sha256").unwrap();
        let credential = hasher.hash("longpassword", "al-ice").unwrap();

        let StoredCredential::Expression {
            template,
            plaintext,
        } = &credential
        else {
            panic!("OpenSSL scheme must defer to storage");
        };
        assert!(template.starts_with("'{sha256}'"));
        assert!(template.contains(PASSWORD_SLOT));
        assert_eq!(plaintext, "longpassword");

        let (fragment, bound) = credential.render("$4");
        assert_eq!(
            fragment,
            "'{sha256}' || encode(digest($4, 'sha256'), 'base64')"
        );
        assert_eq!(bound, "longpassword");
    }

    #[test]
    fn test_literal_function_scheme() {
        let hasher = CredentialHasher::new("md5").unwrap();
        let credential = hasher.hash("longpassword", "al-ice").unwrap();

        let (fragment, bound) = credential.render("$4");
        assert_eq!(fragment, "md5($4)");
        assert_eq!(bound, "longpassword");
    }

    #[test]
    fn test_literal_render_keeps_placeholder() {
        let credential = StoredCredential::Literal("abc123".into());
        let (fragment, bound) = credential.render("$4");
        assert_eq!(fragment, "$4");
        assert_eq!(bound, "abc123");
    }
}
