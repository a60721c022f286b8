//! Reqwest-backed semantic match oracle.

use covtrace_core::{
    CovTraceError, MatchOracle, OracleFuture, OracleRequest, OracleResponse, Result,
};
use reqwest::Client;

/// Oracle reached over HTTP: one POST per scenario, bearer-authenticated.
pub(crate) struct HttpOracle {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpOracle {
    /// Build an oracle client; both the URL and the key are required.
    pub(crate) fn new(url: Option<String>, api_key: Option<String>) -> Result<Self> {
        let url = url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                CovTraceError::OracleUnavailable(
                    "no oracle URL configured; set COVTRACE_ORACLE_URL or pass --oracle-replay"
                        .to_string(),
                )
            })?;
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CovTraceError::OracleUnavailable(
                    "no oracle credentials configured; set COVTRACE_ORACLE_KEY".to_string(),
                )
            })?;
        let client = Client::builder()
            .user_agent("covtrace-cli")
            .build()
            .map_err(|err| {
                CovTraceError::OracleUnavailable(format!("cannot build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

async fn post_request(oracle: &HttpOracle, request: &OracleRequest) -> Result<OracleResponse> {
    let unavailable = |err: reqwest::Error| {
        CovTraceError::OracleUnavailable(format!("oracle at {} failed: {err}", oracle.url))
    };
    let response = oracle
        .client
        .post(&oracle.url)
        .bearer_auth(&oracle.api_key)
        .header("Accept", "application/json")
        .json(request)
        .send()
        .await
        .map_err(unavailable)?
        .error_for_status()
        .map_err(unavailable)?;
    let body = response.text().await.map_err(unavailable)?;
    serde_json::from_str(&body).map_err(|err| CovTraceError::OracleContract {
        endpoint_key: request.endpoint_key.clone(),
        scenario: request.scenario.text.clone(),
        message: format!("undecodable oracle response: {err}"),
    })
}

impl MatchOracle for HttpOracle {
    fn match_scenario<'a>(&'a self, request: &'a OracleRequest) -> OracleFuture<'a> {
        Box::pin(post_request(self, request))
    }
}
