//! Package providers.
//!
//! | provider | parent | enumerates | tool                  |
//! |----------|--------|------------|-----------------------|
//! | dpkg     | –      | yes        | dpkg, dpkg-query      |
//! | apt      | dpkg   | via dpkg   | apt-get, apt-cache    |
//! | rpm      | –      | yes        | rpm                   |
//! | yum      | rpm    | via rpm    | yum                   |
//! | dnf      | yum    | via rpm    | dnf                   |
//! | brew     | –      | yes        | brew                  |
//! | pip      | –      | per target | pip (or `command`)    |

pub mod apt;
pub mod brew;
pub mod dpkg;
pub mod pip;
pub mod rpm;
pub mod yum;

use provider::{ProviderContext, ProviderError, Resource, Result, Value};

/// Extra flags from the `install_options` parameter.
pub(crate) fn install_options(resource: &Resource) -> Vec<String> {
    resource.param_list("install_options")
}

/// The `source` parameter, required by file-based installers.
pub(crate) fn require_source<'a>(ctx: &ProviderContext<'_>, resource: &'a Resource) -> Result<&'a str> {
    resource
        .param_text("source")
        .ok_or_else(|| ProviderError::InvalidValue {
            attribute: "source".to_string(),
            message: format!("{} installs from a package file; set source", ctx.provider()),
        })
}

/// Version requested by an ensure value, if it names one.
pub(crate) fn requested_version(ensure: &Value) -> Option<&str> {
    ensure.as_text()
}

/// Whether the resource wants the package pinned.
pub(crate) fn wants_hold(resource: &Resource, ensure: &Value) -> bool {
    matches!(ensure, Value::Held)
        || resource
            .should("mark")
            .and_then(Value::as_text)
            .is_some_and(|mark| mark == "hold")
}
