//! User providers.
//!
//! Accounts are enumerated straight from the passwd and group databases;
//! only changes go through the administration tools.

pub mod useradd;

use provider::{PropertyHash, ProviderError, Result, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Parse passwd and group file contents into one hash per account.
///
/// Supplementary groups come from the member lists in the group file and
/// are sorted. Malformed lines are skipped.
pub(crate) fn parse_accounts(passwd: &str, group: &str) -> Vec<PropertyHash> {
    let mut memberships: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for line in group.lines().filter(|l| !l.starts_with('#')) {
        let fields: Vec<&str> = line.split(':').collect();
        let [name, _, _, members] = fields.as_slice() else {
            continue;
        };
        for member in members.split(',').map(str::trim).filter(|m| !m.is_empty()) {
            memberships.entry(member).or_default().push((*name).to_string());
        }
    }

    passwd
        .lines()
        .filter(|l| !l.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            let [name, _, uid, gid, comment, home, shell] = fields.as_slice() else {
                return None;
            };
            let (Ok(uid), Ok(gid)) = (uid.parse::<i64>(), gid.parse::<i64>()) else {
                log::debug!("Skipping passwd entry with bad ids: {name}");
                return None;
            };
            let mut groups = memberships.get(name).cloned().unwrap_or_default();
            groups.sort();
            Some(
                PropertyHash::new(name, Value::Present)
                    .with_property("uid", uid)
                    .with_property("gid", gid)
                    .with_property("comment", Value::text(*comment))
                    .with_property("home", Value::text(*home))
                    .with_property("shell", Value::text(*shell))
                    .with_property("groups", Value::List(groups)),
            )
        })
        .collect()
}

/// Read and parse the account databases.
pub(crate) fn read_accounts(passwd: &Path, group: &Path) -> Result<Vec<PropertyHash>> {
    let read = |path: &Path| {
        std::fs::read_to_string(path).map_err(|source| ProviderError::Read {
            path: path.to_path_buf(),
            source,
        })
    };
    let passwd = read(passwd)?;
    // A missing group file only loses supplementary groups
    let group = std::fs::read_to_string(group).unwrap_or_default();
    Ok(parse_accounts(&passwd, &group))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
alice:x:1001:1001:Alice Liddell:/home/alice:/bin/bash
broken:x:abc:1:::
";

    const GROUP: &str = "\
wheel:x:10:alice
docker:x:999:bob,alice
alice:x:1001:
";

    #[test]
    fn test_parse_accounts() {
        let accounts = parse_accounts(PASSWD, GROUP);
        assert_eq!(accounts.len(), 2);

        let alice = &accounts[1];
        assert_eq!(alice.name, "alice");
        assert_eq!(alice.get("uid"), Some(&Value::Integer(1001)));
        assert_eq!(alice.get("comment"), Some(&Value::text("Alice Liddell")));
        assert_eq!(alice.get("groups"), Some(&Value::list(["docker", "wheel"])));
        assert_eq!(accounts[0].get("groups"), Some(&Value::List(Vec::new())));
    }

    #[test]
    fn test_missing_passwd_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_accounts(&dir.path().join("passwd"), &dir.path().join("group")).unwrap_err();
        assert!(err.to_string().contains("passwd"));
    }
}
