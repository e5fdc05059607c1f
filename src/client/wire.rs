//! JSON messages exchanged with match functions

use crate::error::{FetchResult, TransportError};
use crate::types::{Match, MatchProfile};
use serde::{Deserialize, Serialize};

/// HTTP path of the match function run operation
pub const RUN_PATH: &str = "/v1/matchfunction:run";

/// Body of a run request, shared by both transports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub profile: MatchProfile,
}

/// One line of a streamed HTTP run response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStreamLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteStatus>,
}

impl RunStreamLine {
    pub fn proposal(proposal: Match) -> Self {
        Self {
            result: Some(RunResult { proposal }),
            error: None,
        }
    }

    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(RemoteStatus {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub proposal: Match,
}

/// Error status reported by a match function
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Reply to an RPC run request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReply {
    #[serde(default)]
    pub proposals: Vec<Match>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunReply {
    pub fn into_result(self) -> FetchResult<Vec<Match>> {
        match self.error {
            Some(message) => Err(TransportError::Remote { message }.into()),
            None => Ok(self.proposals),
        }
    }
}

/// Decode a newline-delimited run response body.
///
/// Blank lines are skipped; the first error line fails the whole response.
pub fn decode_run_stream(body: &str) -> FetchResult<Vec<Match>> {
    let mut proposals = Vec::new();

    for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let item: RunStreamLine = serde_json::from_str(line).map_err(TransportError::from)?;

        if let Some(status) = item.error {
            return Err(TransportError::Remote {
                message: status.message,
            }
            .into());
        }
        if let Some(result) = item.result {
            proposals.push(result.proposal);
        }
    }

    Ok(proposals)
}
