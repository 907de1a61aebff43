//! Client side of the agent RPC surface
//!
//! Used by the control plane to reach the agent on the host that owns a
//! deployable.

use accel_domain::Deployable;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{ProgramAccepted, ProgramRequest};
use crate::{AgentError, Result};

/// Destination host for a call: the explicit host wins, otherwise the
/// host recorded on the deployable.
pub fn compute_host(explicit_host: Option<&str>, deployable: Option<&Deployable>) -> Result<String> {
    explicit_host
        .filter(|host| !host.is_empty())
        .or_else(|| deployable.map(|d| d.host.as_str()).filter(|host| !host.is_empty()))
        .map(str::to_string)
        .ok_or(AgentError::HostNotFound)
}

pub struct AgentClient {
    client: reqwest::Client,
    port: u16,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            port,
            timeout,
        }
    }

    /// Ask the owning agent to program `deployable` with `firmware_id`
    pub async fn program_device(
        &self,
        explicit_host: Option<&str>,
        deployable: &Deployable,
        firmware_id: &str,
    ) -> Result<ProgramAccepted> {
        let host = compute_host(explicit_host, Some(deployable))?;
        let url = format!(
            "http://{}:{}/api/v1/deployables/{}/program",
            host, self.port, deployable.uuid
        );
        debug!(url = %url, firmware = %firmware_id, "Sending program request");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&ProgramRequest {
                firmware_id: firmware_id.to_string(),
            })
            .send()
            .await
            .map_err(|e| AgentError::Rpc(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no error detail")
                .to_string();
            warn!(host = %host, status = %status, "Program request refused: {}", message);
            return Err(AgentError::Rpc(format!("{}: {}", status, message)));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::Rpc(e.to_string()))
    }
}
