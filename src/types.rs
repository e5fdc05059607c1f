//! Common types used throughout the backend service

use crate::error::{FetchError, FetchResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for matches
pub type MatchId = String;

/// Criteria describing what kind of match to search for.
///
/// Only `name` is interpreted (for logging); every other field is carried
/// through to the match function untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchProfile {
    pub name: String,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl MatchProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Map::new(),
        }
    }
}

/// A proposed match, forwarded verbatim to the caller
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Match {
    pub match_id: MatchId,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Match {
    pub fn with_id(match_id: impl Into<MatchId>) -> Self {
        Self {
            match_id: match_id.into(),
            payload: Map::new(),
        }
    }
}

/// Transport used to reach a match function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Rest,
    Rpc,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Rest => write!(f, "rest"),
            TransportKind::Rpc => write!(f, "rpc"),
        }
    }
}

/// Network location of a match function
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionEndpoint {
    pub host: String,
    pub port: i32,
}

impl FunctionEndpoint {
    pub fn new(host: impl Into<String>, port: i32) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Match function configuration as received on the wire.
///
/// Exactly one of `rest` or `rpc` must be set; [`FunctionReference::resolve`]
/// enforces that.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rest: Option<FunctionEndpoint>,
    #[serde(default)]
    pub rpc: Option<FunctionEndpoint>,
}

impl FunctionConfig {
    pub fn rest(name: impl Into<String>, host: impl Into<String>, port: i32) -> Self {
        Self {
            name: name.into(),
            rest: Some(FunctionEndpoint::new(host, port)),
            rpc: None,
        }
    }

    pub fn rpc(name: impl Into<String>, host: impl Into<String>, port: i32) -> Self {
        Self {
            name: name.into(),
            rest: None,
            rpc: Some(FunctionEndpoint::new(host, port)),
        }
    }
}

/// Validated reference to a match function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionReference {
    Rest(FunctionEndpoint),
    Rpc(FunctionEndpoint),
}

impl FunctionReference {
    /// Validate the wire configuration into exactly one transport variant
    pub fn resolve(config: Option<&FunctionConfig>) -> FetchResult<Self> {
        match config {
            Some(FunctionConfig {
                rest: Some(endpoint),
                rpc: None,
                ..
            }) => Ok(FunctionReference::Rest(endpoint.clone())),
            Some(FunctionConfig {
                rest: None,
                rpc: Some(endpoint),
                ..
            }) => Ok(FunctionReference::Rpc(endpoint.clone())),
            _ => Err(FetchError::unsupported_function_type()),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            FunctionReference::Rest(_) => TransportKind::Rest,
            FunctionReference::Rpc(_) => TransportKind::Rpc,
        }
    }

    pub fn endpoint(&self) -> &FunctionEndpoint {
        match self {
            FunctionReference::Rest(endpoint) | FunctionReference::Rpc(endpoint) => endpoint,
        }
    }

    /// Key under which the client for this reference is cached
    pub fn cache_key(&self) -> ClientKey {
        let endpoint = self.endpoint();
        ClientKey {
            kind: self.kind(),
            host: endpoint.host.clone(),
            port: endpoint.port,
        }
    }
}

/// Identity of a cached match function client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub kind: TransportKind,
    pub host: String,
    pub port: i32,
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.kind, self.host, self.port)
    }
}

/// Request to fetch matches for a set of profiles
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    #[serde(default)]
    pub config: Option<FunctionConfig>,
    #[serde(default)]
    pub profiles: Vec<MatchProfile>,
}

/// Result of one match function invocation
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub matches: Vec<Match>,
    pub error: Option<FetchError>,
}

impl InvocationOutcome {
    pub fn success(matches: Vec<Match>) -> Self {
        Self {
            matches,
            error: None,
        }
    }

    pub fn failure(error: FetchError) -> Self {
        Self {
            matches: Vec::new(),
            error: Some(error),
        }
    }
}

impl From<FetchResult<Vec<Match>>> for InvocationOutcome {
    fn from(result: FetchResult<Vec<Match>>) -> Self {
        match result {
            Ok(matches) => Self::success(matches),
            Err(error) => Self::failure(error),
        }
    }
}
