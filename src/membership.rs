//! Comma-separated membership column handling.
//!
//! The daemon stores a group's members as one delimited string. Every
//! mutation goes through these helpers so the column never holds a
//! duplicate token, an empty token, or a stray comma.

const SEPARATOR: char = ',';

/// Split a members column into its login tokens, dropping empties left
/// by historic double or trailing commas.
pub fn tokens(members: &str) -> Vec<&str> {
    members
        .split(SEPARATOR)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Exact token match. A substring check would make `bob` match
/// `bobby`, which corrupted membership lists in older admin tools.
pub fn contains(members: &str, login: &str) -> bool {
    tokens(members).iter().any(|token| *token == login)
}

/// Append `login` unless already present. Idempotent.
pub fn add(members: &str, login: &str) -> String {
    let mut list = tokens(members);
    if !list.iter().any(|token| *token == login) {
        list.push(login);
    }
    list.join(",")
}

/// Remove the exact `login` token, normalizing separators on the way.
pub fn remove(members: &str, login: &str) -> String {
    tokens(members)
        .into_iter()
        .filter(|token| *token != login)
        .collect::<Vec<_>>()
        .join(",")
}

/// Normalize an arbitrary token list into a storable members column:
/// empties dropped, duplicates collapsed, order preserved.
pub fn normalize<I, S>(logins: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for login in logins {
        let login = login.as_ref();
        if !login.is_empty() && !out.iter().any(|seen| seen == login) {
            out.push(login.to_owned());
        }
    }
    out.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let once = add("", "bob");
        let twice = add(&once, "bob");
        assert_eq!(once, "bob");
        assert_eq!(twice, "bob");
    }

    #[test]
    fn test_add_then_remove_round_trips() {
        let before = "alice,carol";
        let with_bob = add(before, "bob");
        assert_eq!(with_bob, "alice,carol,bob");
        assert_eq!(remove(&with_bob, "bob"), before);
    }

    #[test]
    fn test_round_trip_from_empty() {
        let with_bob = add("", "bob");
        assert_eq!(with_bob, "bob");
        // back to empty, no stray comma.
        assert_eq!(remove(&with_bob, "bob"), "");
    }

    #[test]
    fn test_exact_token_match() {
        assert!(!contains("bobby,alice", "bob"));
        assert!(contains("bobby,alice", "bobby"));
        assert_eq!(remove("bobby,alice", "bob"), "bobby,alice");
    }

    #[test]
    fn test_remove_normalizes_stray_commas() {
        assert_eq!(remove("alice,,bob,", "bob"), "alice");
        assert_eq!(remove(",alice", "nobody"), "alice");
    }

    #[test]
    fn test_never_double_separator() {
        let members = add(&add("", "alice"), "bob");
        assert!(!members.contains(",,"));
        assert!(!members.starts_with(','));
        assert!(!members.ends_with(','));
    }

    #[test]
    fn test_normalize_drops_duplicates_and_empties() {
        assert_eq!(
            normalize(["alice", "", "bob", "alice"]),
            "alice,bob"
        );
        assert_eq!(normalize(Vec::<String>::new()), "");
    }
}
