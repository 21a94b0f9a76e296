//! Azure Resource Manager client utilities.
//!
//! A thin client for the handful of ARM operations an image build needs:
//!
//! - resource group create / exists / delete
//! - template deployments
//! - virtual machine lookup, power off, generalize and capture
//!
//! Authentication is a bearer token taken from `AZURE_ACCESS_TOKEN`. The base
//! URL comes from `ARM_API_BASE` (default `https://management.azure.com`) and
//! is validated so a misconfigured environment cannot ship the token to an
//! arbitrary host.
//!
//! Long-running operations are awaited inside the client (see [`poll`]), so
//! callers see each call as a single request that either succeeds or fails.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use imagesmith_types::VirtualMachine;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url, header};
use serde_json::{Value, json};
use tracing::debug;

pub mod poll;
#[cfg(test)]
mod test_server;

pub use poll::PollSettings;

/// Default public ARM endpoint.
pub const DEFAULT_ARM_BASE: &str = "https://management.azure.com";
/// Environment variable overriding the ARM endpoint.
pub const ARM_BASE_ENV: &str = "ARM_API_BASE";
/// Environment variable holding the bearer token.
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

const COMPUTE_API_VERSION: &str = "2017-03-30";
const RESOURCES_API_VERSION: &str = "2021-04-01";

/// Management domains (and their subdomains) the client may talk to.
const ALLOWED_ARM_DOMAINS: &[&str] = &[
    "management.azure.com",
    "management.usgovcloudapi.net",
    "management.chinacloudapi.cn",
    "management.microsoftazure.de",
];
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Thin wrapper around a configured `reqwest::Client` scoped to one subscription.
#[derive(Debug, Clone)]
pub struct ArmClient {
    base_url: String,
    subscription_id: String,
    http: Client,
    poll: PollSettings,
}

impl ArmClient {
    /// Builds a client from `AZURE_ACCESS_TOKEN` and `ARM_API_BASE`.
    pub fn new_from_env(subscription_id: impl Into<String>, poll: PollSettings) -> Result<Self> {
        let token = env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| anyhow!("{ACCESS_TOKEN_ENV} is not set; obtain one with `az account get-access-token`"))?;
        let base_url = env::var(ARM_BASE_ENV).unwrap_or_else(|_| DEFAULT_ARM_BASE.into());
        Self::new(base_url, subscription_id, &token, poll)
    }

    /// Builds a client for an explicit endpoint and token.
    pub fn new(base_url: impl Into<String>, subscription_id: impl Into<String>, token: &str, poll: PollSettings) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        let mut default_headers = header::HeaderMap::new();
        let mut authorization =
            header::HeaderValue::from_str(&format!("Bearer {token}")).context("access token is not a valid header value")?;
        authorization.set_sensitive(true);
        default_headers.insert(header::AUTHORIZATION, authorization);
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .user_agent(format!("imagesmith/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS))
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;

        Ok(Self {
            base_url,
            subscription_id: subscription_id.into(),
            http,
            poll,
        })
    }

    /// Fetches the current description of a virtual machine.
    pub async fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        let path = self.compute_path(resource_group, name, "");
        let response = self.send(Method::GET, &path, COMPUTE_API_VERSION, None).await?;
        let response = ensure_success(response, "get virtual machine").await?;
        response.json::<VirtualMachine>().await.context("decode virtual machine")
    }

    /// Creates (or updates) a resource group.
    pub async fn create_resource_group(&self, name: &str, location: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let path = self.resource_group_path(name);
        let body = json!({ "location": location, "tags": tags });
        let response = self.send(Method::PUT, &path, RESOURCES_API_VERSION, Some(&body)).await?;
        ensure_success(response, "create resource group").await?;
        Ok(())
    }

    /// Whether the resource group exists (`HEAD` answers 204 or 404).
    pub async fn resource_group_exists(&self, name: &str) -> Result<bool> {
        let path = self.resource_group_path(name);
        let response = self.send(Method::HEAD, &path, RESOURCES_API_VERSION, None).await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => bail!("check resource group failed: HTTP {}", status.as_u16()),
        }
    }

    /// Deletes a resource group and waits for the deletion to finish.
    pub async fn delete_resource_group(&self, name: &str) -> Result<()> {
        let path = self.resource_group_path(name);
        let response = self.send(Method::DELETE, &path, RESOURCES_API_VERSION, None).await?;
        let response = ensure_success(response, "delete resource group").await?;
        self.wait_for_operation(response, "delete resource group").await?;
        Ok(())
    }

    /// Submits a template deployment and waits until ARM reports a terminal
    /// provisioning state for it.
    pub async fn create_deployment(&self, resource_group: &str, deployment: &str, template: &Value, parameters: &Value) -> Result<()> {
        let path = self.deployment_path(resource_group, deployment);
        let body = json!({
            "properties": {
                "mode": "Incremental",
                "template": template,
                "parameters": parameters,
            }
        });
        let response = self.send(Method::PUT, &path, RESOURCES_API_VERSION, Some(&body)).await?;
        ensure_success(response, "create deployment").await?;

        let path = path.as_str();
        poll::wait_until(&self.poll, "deployment", move || async move {
            let response = self.send(Method::GET, path, RESOURCES_API_VERSION, None).await?;
            let response = ensure_success(response, "get deployment").await?;
            let payload: Value = response.json().await.context("decode deployment")?;
            let state = payload
                .pointer("/properties/provisioningState")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();
            match state.as_str() {
                "Succeeded" => Ok(Some(())),
                "Failed" | "Canceled" => {
                    let detail = payload.pointer("/properties/error").map(describe_arm_error).unwrap_or_default();
                    bail!("deployment '{deployment}' finished as {state}{detail}")
                }
                _ => Ok(None),
            }
        })
        .await
    }

    /// Stops and deallocates a virtual machine.
    pub async fn power_off(&self, resource_group: &str, name: &str) -> Result<()> {
        self.compute_action(resource_group, name, "deallocate", None).await.map(|_| ())
    }

    /// Marks a deallocated virtual machine as generalized.
    pub async fn generalize(&self, resource_group: &str, name: &str) -> Result<()> {
        self.compute_action(resource_group, name, "generalize", None).await.map(|_| ())
    }

    /// Captures a generalized VM and returns the URI of the captured OS image.
    pub async fn capture(&self, resource_group: &str, name: &str, vhd_prefix: &str, container: &str) -> Result<String> {
        let body = json!({
            "vhdPrefix": vhd_prefix,
            "destinationContainerName": container,
            "overwriteVhds": true,
        });
        let output = self.compute_action(resource_group, name, "capture", Some(&body)).await?;
        captured_image_uri(&output).ok_or_else(|| anyhow!("capture output did not include an OS disk image uri"))
    }

    async fn compute_action(&self, resource_group: &str, name: &str, action: &str, body: Option<&Value>) -> Result<Value> {
        let path = self.compute_path(resource_group, name, &format!("/{action}"));
        let response = self.send(Method::POST, &path, COMPUTE_API_VERSION, body).await?;
        let response = ensure_success(response, action).await?;
        self.wait_for_operation(response, action).await
    }

    async fn wait_for_operation(&self, response: Response, operation: &str) -> Result<Value> {
        match poll::operation_url(&response) {
            Some(url) => poll::wait_for_async_operation(&self.http, &self.poll, &url, operation).await,
            None => {
                let text = response.text().await.context("read operation result")?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                serde_json::from_str(&text).context("decode operation result")
            }
        }
    }

    async fn send(&self, method: Method, path: &str, api_version: &str, body: Option<&Value>) -> Result<Response> {
        let mut builder = self.request(method, path, api_version)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.send().await.map_err(|error| anyhow!("network error: {error}"))
    }

    fn request(&self, method: Method, path: &str, api_version: &str) -> Result<RequestBuilder> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path)).with_context(|| format!("invalid request path '{path}'"))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        debug!(%method, %url, "building request");
        Ok(self.http.request(method, url))
    }

    fn resource_group_path(&self, name: &str) -> String {
        format!("/subscriptions/{}/resourcegroups/{}", self.subscription_id, name)
    }

    fn deployment_path(&self, resource_group: &str, deployment: &str) -> String {
        format!(
            "{}/providers/Microsoft.Resources/deployments/{}",
            self.resource_group_path(resource_group),
            deployment
        )
    }

    fn compute_path(&self, resource_group: &str, name: &str, suffix: &str) -> String {
        format!(
            "{}/providers/Microsoft.Compute/virtualMachines/{}{}",
            self.resource_group_path(resource_group),
            name,
            suffix
        )
    }
}

/// Turns a non-2xx response into an error carrying the ARM error code and message.
pub(crate) async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|payload| payload.get("error").map(describe_arm_error))
        .unwrap_or_else(|| {
            if text.is_empty() {
                String::new()
            } else {
                format!(": {}", imagesmith_util::redact_sensitive(&text))
            }
        });
    bail!("{operation} failed: HTTP {}{detail}", status.as_u16())
}

/// Formats an ARM `error` object as `: Code: message`.
fn describe_arm_error(error: &Value) -> String {
    let code = error.get("code").and_then(Value::as_str).unwrap_or("Error");
    let message = error.get("message").and_then(Value::as_str).unwrap_or("no message");
    format!(": {code}: {message}")
}

/// Reads `resources[0].properties.storageProfile.osDisk.image.uri` from a capture output.
fn captured_image_uri(output: &Value) -> Option<String> {
    let output = output.pointer("/properties/output").unwrap_or(output);
    output
        .pointer("/resources/0/properties/storageProfile/osDisk/image/uri")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS and the host must be an Azure management
///   domain or a subdomain of one
fn validate_base_url(base: &str) -> Result<()> {
    let parsed = Url::parse(base).map_err(|error| anyhow!("invalid {ARM_BASE_ENV} URL '{base}': {error}"))?;
    let host = parsed.host_str().ok_or_else(|| anyhow!("{ARM_BASE_ENV} must include a host"))?;

    if LOCALHOST_DOMAINS.iter().any(|&allowed| host.eq_ignore_ascii_case(allowed)) {
        return Ok(());
    }

    if parsed.scheme() != "https" {
        bail!("{ARM_BASE_ENV} must use https for non-localhost hosts; got '{}://'", parsed.scheme());
    }

    let allowed = ALLOWED_ARM_DOMAINS
        .iter()
        .any(|&domain| host.eq_ignore_ascii_case(domain) || host.ends_with(&format!(".{domain}")));
    if !allowed {
        bail!("{ARM_BASE_ENV} host '{host}' is not an Azure management endpoint");
    }
    Ok(())
}
