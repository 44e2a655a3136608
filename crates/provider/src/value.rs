//! Attribute values for desired ("should") and observed ("is") state.

use serde::{Serialize, Serializer};
use std::fmt;

/// A single attribute value.
///
/// The symbolic variants are the ensure states shared by every resource
/// type; `Held` and `Purged` are only accepted by providers declaring the
/// matching feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Entity does not exist
    Absent,
    /// Entity exists, any version
    Present,
    /// Entity exists at the newest available version
    Latest,
    /// Entity and its configuration are removed
    Purged,
    /// Entity exists and is pinned against upgrades
    Held,
    /// Free text (a version, a path, a shell)
    Text(String),
    /// Unordered list of strings (groups, options)
    List(Vec<String>),
    /// Integer (uid, gid)
    Integer(i64),
}

impl Value {
    /// Parse a catalog string, recognizing the ensure symbols.
    ///
    /// `installed` is accepted as an alias of `present`.
    pub fn parse_symbol(s: &str) -> Self {
        match s.trim() {
            "absent" => Self::Absent,
            "present" | "installed" => Self::Present,
            "latest" => Self::Latest,
            "purged" => Self::Purged,
            "held" => Self::Held,
            other => Self::Text(other.to_string()),
        }
    }

    /// Create a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a list value.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// True for states meaning "does not exist".
    pub fn is_absent_like(&self) -> bool {
        matches!(self, Self::Absent | Self::Purged)
    }

    /// True for states meaning "exists in some form".
    pub fn is_present_like(&self) -> bool {
        matches!(
            self,
            Self::Present | Self::Latest | Self::Held | Self::Text(_)
        )
    }

    /// The text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The list payload, if any.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Compare two values the way the diff does.
    ///
    /// Lists are unordered; an integer and its decimal text are equal, since
    /// observed values often come back from a tool as text.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => {
                let mut a = a.clone();
                let mut b = b.clone();
                a.sort();
                a.dedup();
                b.sort();
                b.dedup();
                a == b
            }
            (Self::Integer(i), Self::Text(s)) | (Self::Text(s), Self::Integer(i)) => {
                s.trim().parse::<i64>().is_ok_and(|parsed| parsed == *i)
            }
            _ => self == other,
        }
    }

    /// Short symbolic name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Present => "present",
            Self::Latest => "latest",
            Self::Purged => "purged",
            Self::Held => "held",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Integer(_) => "integer",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
            Self::Integer(i) => write!(f, "{i}"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::List(items) => items.serialize(serializer),
            Self::Integer(i) => serializer.serialize_i64(*i),
            other => serializer.collect_str(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::parse_symbol(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}
