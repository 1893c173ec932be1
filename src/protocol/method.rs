//! RPC method kinds and the connection-state side effect each one carries.

use std::fmt;

/// Effect a successful call has on the adapter's connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// `params[0]`/`params[1]` become the bound namespace/database
    SelectNamespaceDatabase,
    /// The decoded result becomes the session token
    TokenFromResult,
    /// `params[0]` becomes the session token
    TokenFromParams,
    /// The session token is dropped
    ClearToken,
    None,
}

/// Every RPC method understood by the engine.
///
/// Unknown names are carried through as [`Method::Other`] so the engine can
/// reject them; they never touch connection state. A hand-built `Other`
/// holding a known name behaves exactly like the named variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Use,
    Info,
    Signup,
    Signin,
    Authenticate,
    Invalidate,
    Let,
    Unset,
    Live,
    Kill,
    Query,
    Select,
    Create,
    Insert,
    Update,
    Upsert,
    Merge,
    Patch,
    Delete,
    Relate,
    Run,
    Version,
    Ping,
    Other(String),
}

impl Method {
    pub fn parse(name: &str) -> Self {
        match name {
            "use" => Method::Use,
            "info" => Method::Info,
            "signup" => Method::Signup,
            "signin" => Method::Signin,
            "authenticate" => Method::Authenticate,
            "invalidate" => Method::Invalidate,
            "let" => Method::Let,
            "unset" => Method::Unset,
            "live" => Method::Live,
            "kill" => Method::Kill,
            "query" => Method::Query,
            "select" => Method::Select,
            "create" => Method::Create,
            "insert" => Method::Insert,
            "update" => Method::Update,
            "upsert" => Method::Upsert,
            "merge" => Method::Merge,
            "patch" => Method::Patch,
            "delete" => Method::Delete,
            "relate" => Method::Relate,
            "run" => Method::Run,
            "version" => Method::Version,
            "ping" => Method::Ping,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Use => "use",
            Method::Info => "info",
            Method::Signup => "signup",
            Method::Signin => "signin",
            Method::Authenticate => "authenticate",
            Method::Invalidate => "invalidate",
            Method::Let => "let",
            Method::Unset => "unset",
            Method::Live => "live",
            Method::Kill => "kill",
            Method::Query => "query",
            Method::Select => "select",
            Method::Create => "create",
            Method::Insert => "insert",
            Method::Update => "update",
            Method::Upsert => "upsert",
            Method::Merge => "merge",
            Method::Patch => "patch",
            Method::Delete => "delete",
            Method::Relate => "relate",
            Method::Run => "run",
            Method::Version => "version",
            Method::Ping => "ping",
            Method::Other(name) => name,
        }
    }

    /// The state side effect applied after this method succeeds.
    pub fn side_effect(&self) -> SideEffect {
        match self {
            Method::Use => SideEffect::SelectNamespaceDatabase,
            Method::Signin | Method::Signup => SideEffect::TokenFromResult,
            Method::Authenticate => SideEffect::TokenFromParams,
            Method::Invalidate => SideEffect::ClearToken,
            Method::Info
            | Method::Let
            | Method::Unset
            | Method::Live
            | Method::Kill
            | Method::Query
            | Method::Select
            | Method::Create
            | Method::Insert
            | Method::Update
            | Method::Upsert
            | Method::Merge
            | Method::Patch
            | Method::Delete
            | Method::Relate
            | Method::Run
            | Method::Version
            | Method::Ping => SideEffect::None,
            // The engine dispatches on the wire name, so state must too.
            Method::Other(name) => match Method::parse(name) {
                Method::Other(_) => SideEffect::None,
                known => known.side_effect(),
            },
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        Method::parse(name)
    }
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        Method::parse(&name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
