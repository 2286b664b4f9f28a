use serde::{Deserialize, Serialize};

/// Canonical identifier of a chat server. Numeric guild ids and their string form share one
/// textual form. `#channel` names lose the `#` and are lowercased, since IRC channel names are
/// case-insensitive; any other string id is kept as given apart from surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        let value = value.trim();
        match value.strip_prefix('#') {
            Some(channel) => Self(channel.trim_start_matches('#').to_lowercase()),
            None => Self(value.to_owned()),
        }
    }
}

impl From<String> for Scope {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&String> for Scope {
    fn from(value: &String) -> Self {
        Self::from(value.as_str())
    }
}

macro_rules! scope_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Scope {
                fn from(value: $ty) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

scope_from_int!(u32, u64, i32, i64);

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display username being counted within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Subject {
    fn from(value: &str) -> Self {
        Self(value.trim().to_owned())
    }
}

impl From<String> for Subject {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl core::fmt::Display for Subject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two tracked actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// created a quote
    Quoted,
    /// asked for a random quote
    Requested,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Quoted => "quoted",
            Kind::Requested => "requested",
        }
    }
}

impl core::fmt::Display for Kind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKey {
    Counter(Kind),
    LastQuote,
}

impl IndicatorKey {
    /// `{prefix:}{namespace}:{scope}`
    pub fn with_scope(&self, prefix: Option<&str>, scope: &Scope) -> String {
        let namespace = match self {
            IndicatorKey::Counter(kind) => kind.as_str(),
            IndicatorKey::LastQuote => "last_quote",
        };

        match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{namespace}:{scope}"),
            _ => format!("{namespace}:{scope}"),
        }
    }
}
