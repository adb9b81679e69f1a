use fhircohort_core::Bundle;
use serde_json::Value;

use crate::auth::AuthHeader;
use crate::error::{ClientError, Result};

/// An open, authenticated connection to one FHIR base URL.
pub struct FhirSession {
    http: reqwest::Client,
    base_url: String,
    auth: Option<AuthHeader>,
}

impl FhirSession {
    pub fn new(http: reqwest::Client, base_url: &str, auth: Option<AuthHeader>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            auth,
        }
    }

    fn fhir_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, url);
        if let Some(auth) = &self.auth {
            req = auth.apply(req);
        }
        req.header("Accept", "application/fhir+json")
    }

    /// `GET {base}/{resource_type}?{params}`
    pub async fn search(&self, resource_type: &str, params: &[(String, String)]) -> Result<Bundle> {
        let url = self.fhir_url(resource_type);
        let resp = self
            .request(reqwest::Method::GET, &url)
            .query(params)
            .send()
            .await
            .map_err(|e| ClientError::transport(&url, e))?;
        let value = handle_response(&url, resp).await?;
        parse_bundle(&url, value)
    }

    /// Follow an absolute page link returned by the server.
    pub async fn get_url(&self, url: &str) -> Result<Bundle> {
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| ClientError::transport(url, e))?;
        let value = handle_response(url, resp).await?;
        parse_bundle(url, value)
    }

    /// `GET {base}/{resource_type}/{id}`
    pub async fn read(&self, resource_type: &str, id: &str) -> Result<Value> {
        let url = self.fhir_url(&format!("{resource_type}/{id}"));
        let resp = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| ClientError::transport(&url, e))?;
        handle_response(&url, resp).await
    }

    /// `GET {base}/metadata`
    pub async fn metadata(&self) -> Result<Value> {
        let url = self.fhir_url("metadata");
        let resp = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| ClientError::transport(&url, e))?;
        handle_response(&url, resp).await
    }
}

fn parse_bundle(url: &str, value: Value) -> Result<Bundle> {
    if value.is_null() {
        return Ok(Bundle::default());
    }
    serde_json::from_value(value).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}

async fn handle_response(url: &str, resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        let mut message = body.clone();
        if let Ok(json) = serde_json::from_str::<Value>(&body)
            && json.get("resourceType").and_then(|v| v.as_str()) == Some("OperationOutcome")
            && let Some(issues) = json.get("issue").and_then(|v| v.as_array())
        {
            let msgs: Vec<&str> = issues
                .iter()
                .filter_map(|i| i.get("diagnostics").and_then(|d| d.as_str()))
                .collect();
            if !msgs.is_empty() {
                message = msgs.join("; ");
            }
        }
        return Err(ClientError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            message,
        });
    }

    if body.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}
