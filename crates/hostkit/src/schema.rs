//! Resource types managed by hostkit providers.

use provider::{AttributeDef, Domain, Feature, ResourceType};

/// Provider can create and move home directories.
pub const MANAGES_HOMEDIR: &str = "manages_homedir";

/// Provider can bypass the name service and edit local files (libuser).
pub const MANAGES_LOCAL_USERS: &str = "manages_local_users";

fn symbols(allowed: &[&str]) -> Domain {
    Domain::Symbols {
        allowed: allowed.iter().map(|s| (*s).to_string()).collect(),
        free_text: false,
    }
}

/// The `package` type.
///
/// `ensure` accepts the usual symbols or a version string (exact or range).
pub fn package_type() -> ResourceType {
    ResourceType::new("package")
        .attribute(
            AttributeDef::ensure(&["present", "absent", "latest", "purged", "held"])
                .free_text()
                .describe("present, absent, latest, purged, held, a version or a version range"),
        )
        .attribute(
            AttributeDef::property("mark")
                .domain(symbols(&["hold", "none"]))
                .requires(Feature::HOLDABLE)
                .describe("Pin the package at its installed version"),
        )
        .attribute(AttributeDef::parameter("source").describe("Local package file or URL"))
        .attribute(
            AttributeDef::parameter("install_options")
                .domain(Domain::List)
                .requires(Feature::INSTALL_OPTIONS)
                .describe("Extra flags passed to the install command"),
        )
        .attribute(
            AttributeDef::parameter("command")
                .describe("Alternate executable for providers that support it (pip)"),
        )
        .attribute(
            AttributeDef::parameter("install_only")
                .domain(Domain::Boolean)
                .requires(Feature::INSTALL_ONLY)
                .describe("Several versions may be installed side by side"),
        )
        .ensure_requires("latest", Feature::UPGRADEABLE)
        .ensure_requires("purged", Feature::PURGEABLE)
        .ensure_requires("held", Feature::HOLDABLE)
        .ensure_requires("text", Feature::VERSIONABLE)
        .ensure_requires("range", Feature::VERSION_RANGES)
}

/// The `user` type.
pub fn user_type() -> ResourceType {
    ResourceType::new("user")
        .attribute(AttributeDef::ensure(&["present", "absent"]))
        .attribute(AttributeDef::property("uid").domain(Domain::Integer))
        .attribute(AttributeDef::property("gid").domain(Domain::Integer))
        .attribute(AttributeDef::property("comment").describe("GECOS field"))
        .attribute(
            AttributeDef::property("home")
                .requires(MANAGES_HOMEDIR)
                .describe("Home directory"),
        )
        .attribute(AttributeDef::property("shell").describe("Login shell"))
        .attribute(
            AttributeDef::property("groups")
                .domain(Domain::List)
                .describe("Supplementary groups"),
        )
        .attribute(
            AttributeDef::parameter("managehome")
                .domain(Domain::Boolean)
                .requires(MANAGES_HOMEDIR)
                .describe("Create the home directory with the user and remove it with it"),
        )
        .attribute(
            AttributeDef::parameter("forcelocal")
                .domain(Domain::Boolean)
                .requires(MANAGES_LOCAL_USERS)
                .describe("Manage the user in local files only"),
        )
}
