//! Error types for provider resolution and convergence.
//!
//! Errors are categorized so the caller can decide how to report a failed
//! resource without matching on every variant. Every error is scoped to a
//! single resource; the run continues for independent resources.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No registered provider can manage the resource on this host
    NoSuitableBackend,
    /// A desired value needs a feature the bound provider lacks
    PropertyNotManageable,
    /// An external tool exited with a failure status
    ExternalCommandFailure,
    /// One identity matched several real-world entities
    AmbiguousEntity,
    /// No available version satisfies the requested range
    VersionRangeUnsatisfiable,
    /// The provider cannot move to an older version
    DowngradeNotSupported,
    /// The catalog or a registration is malformed
    Invalid,
    /// A provider broke the framework contract
    Internal,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NoSuitableBackend => "No suitable provider",
            Self::PropertyNotManageable => "Property not manageable",
            Self::ExternalCommandFailure => "External command failed",
            Self::AmbiguousEntity => "Ambiguous entity",
            Self::VersionRangeUnsatisfiable => "Version range unsatisfiable",
            Self::DowngradeNotSupported => "Downgrade not supported",
            Self::Invalid => "Invalid declaration",
            Self::Internal => "Provider bug",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NoSuitableBackend => {
                "Install the tool the provider needs, or pin a provider that works on this host"
            }
            Self::PropertyNotManageable => "Pick a provider with the required feature or drop the value",
            Self::ExternalCommandFailure => "Check the command output for details",
            Self::AmbiguousEntity => "Disambiguate the name (architecture, flavor) in the catalog",
            Self::VersionRangeUnsatisfiable => "Widen the range or add a repository that carries it",
            Self::DowngradeNotSupported => "Remove the resource first or pin the current version",
            Self::Invalid => "Fix the declaration",
            Self::Internal => "Report this as a provider bug",
        }
    }
}

/// Errors that can occur while resolving or converging a resource.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No registered provider is suitable on this host
    #[error("no suitable provider for {type_name}[{name}]")]
    NoSuitableProvider {
        /// Resource type name
        type_name: String,
        /// Resource identity
        name: String,
    },

    /// Several providers are suitable but none is a default here
    #[error(
        "no default provider for {type_name} on this host; pin one of: {}",
        .suitable.join(", ")
    )]
    NoDefaultProvider {
        /// Resource type name
        type_name: String,
        /// Suitable providers the caller may pin
        suitable: Vec<String>,
    },

    /// An explicitly requested provider is unknown or unsuitable
    #[error("provider '{provider}' for {type_name} is {reason}")]
    UnknownProvider {
        /// Resource type name
        type_name: String,
        /// Requested provider name
        provider: String,
        /// Why it was rejected ("not registered", "not suitable: ...")
        reason: String,
    },

    /// A desired value needs a feature the provider does not declare
    #[error("{attribute} on {resource} needs feature '{feature}', which provider '{provider}' lacks")]
    PropertyNotManageable {
        /// Resource reference, e.g. `package[nginx]`
        resource: String,
        /// Attribute name
        attribute: String,
        /// Missing feature
        feature: String,
        /// Bound provider
        provider: String,
    },

    /// External command returned a failure status
    #[error("command failed: {command} (exit {}): {stderr}", .status.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    CommandFailed {
        /// Rendered command line
        command: String,
        /// Exit code, if the process exited normally
        status: Option<i32>,
        /// Trimmed standard error output
        stderr: String,
    },

    /// External command could not be started at all
    #[error("failed to execute {}: {source}", .program.display())]
    Exec {
        /// Program path
        program: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A system database file could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A command succeeded but its output made no sense
    #[error("could not parse output of {command}: {message}")]
    Parse {
        /// Command whose output was read
        command: String,
        /// What went wrong
        message: String,
    },

    /// One identity matched several entities
    #[error("{resource} matches several entities: {}", .candidates.join(", "))]
    AmbiguousEntity {
        /// Resource reference
        resource: String,
        /// Descriptions of the matching entities
        candidates: Vec<String>,
    },

    /// No candidate version satisfies the requested range
    #[error("no available version of {resource} satisfies '{range}'")]
    VersionRangeUnsatisfiable {
        /// Resource reference
        resource: String,
        /// The unmet range expression
        range: String,
    },

    /// Moving to an older version is not supported
    #[error("{resource} is at {current}; provider '{provider}' cannot downgrade to {requested}")]
    DowngradeNotSupported {
        /// Resource reference
        resource: String,
        /// Installed version
        current: String,
        /// Requested version
        requested: String,
        /// Bound provider
        provider: String,
    },

    /// A value outside the attribute's domain
    #[error("invalid value for {attribute}: {message}")]
    InvalidValue {
        /// Attribute name
        attribute: String,
        /// What is wrong
        message: String,
    },

    /// An attribute the resource type does not define
    #[error("{type_name} has no attribute '{attribute}'")]
    UnknownAttribute {
        /// Resource type name
        type_name: String,
        /// Attribute name
        attribute: String,
    },

    /// A resource type nobody registered
    #[error("unknown resource type '{0}'")]
    UnknownType(String),

    /// A malformed provider registration
    #[error("invalid registration: {0}")]
    Registration(String),

    /// A provider invoked a command it never declared or that did not resolve
    #[error("provider '{provider}' has no usable command '{symbol}'")]
    CommandUnavailable {
        /// Provider name
        provider: String,
        /// Command symbol
        symbol: String,
    },

    /// A property changed but the provider has no setter for it
    #[error("provider '{provider}' has no setter for '{attribute}'")]
    MissingSetter {
        /// Provider name
        provider: String,
        /// Attribute name
        attribute: String,
    },

    /// A lifecycle operation the provider does not implement
    #[error("provider '{provider}' does not support {operation}")]
    Unsupported {
        /// Provider name
        provider: String,
        /// Operation name
        operation: String,
    },
}

impl ProviderError {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoSuitableProvider { .. }
            | Self::NoDefaultProvider { .. }
            | Self::UnknownProvider { .. } => ErrorCategory::NoSuitableBackend,
            Self::PropertyNotManageable { .. } => ErrorCategory::PropertyNotManageable,
            Self::CommandFailed { .. }
            | Self::Exec { .. }
            | Self::Read { .. }
            | Self::Parse { .. } => {
                ErrorCategory::ExternalCommandFailure
            }
            Self::AmbiguousEntity { .. } => ErrorCategory::AmbiguousEntity,
            Self::VersionRangeUnsatisfiable { .. } => ErrorCategory::VersionRangeUnsatisfiable,
            Self::DowngradeNotSupported { .. } => ErrorCategory::DowngradeNotSupported,
            Self::InvalidValue { .. }
            | Self::UnknownAttribute { .. }
            | Self::UnknownType(_)
            | Self::Registration(_) => ErrorCategory::Invalid,
            Self::CommandUnavailable { .. }
            | Self::MissingSetter { .. }
            | Self::Unsupported { .. } => ErrorCategory::Internal,
        }
    }

    /// Standard error of a failed command, if this is one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        let err = ProviderError::NoDefaultProvider {
            type_name: "package".into(),
            suitable: vec!["pip".into()],
        };
        assert_eq!(err.category(), ErrorCategory::NoSuitableBackend);

        let err = ProviderError::MissingSetter {
            provider: "apt".into(),
            attribute: "mark".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_command_failed_display() {
        let err = ProviderError::CommandFailed {
            command: "/usr/bin/apt-get install nginx".into(),
            status: Some(100),
            stderr: "E: Unable to locate package nginx".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit 100"));
        assert!(msg.contains("Unable to locate"));
        assert_eq!(err.stderr(), Some("E: Unable to locate package nginx"));

        let killed = ProviderError::CommandFailed {
            command: "rpm -qa".into(),
            status: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("exit signal"));
    }

    #[test]
    fn test_no_default_lists_candidates() {
        let err = ProviderError::NoDefaultProvider {
            type_name: "package".into(),
            suitable: vec!["pip".into(), "rpm".into()],
        };
        assert!(err.to_string().contains("pip, rpm"));
    }
}
