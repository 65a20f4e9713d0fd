use crate::crm::endpoint::{Endpoint, Result};
use crate::crm::error::CrmError;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Stateless client for the CRM's HTTP webhook protocol (§6). Holds nothing but its
/// own transport and base URL; safe to share across call workers (§5).
#[derive(Clone)]
pub struct CrmClient {
    inner: reqwest::Client,
    webhook_url: String,
}

impl CrmClient {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            inner: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("reqwest client builder should not fail with default settings"),
            webhook_url: webhook_url.into(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.webhook_url.trim_end_matches('/'), path)
    }

    pub async fn hit<T: Endpoint>(&self, endpoint: T) -> Result<T::ResponseBody> {
        let path = endpoint.path().to_string();
        let method = endpoint.method();
        let url = self.url_for(&path);

        let mut builder = self.inner.request(method.clone(), &url);
        builder = match method {
            Method::GET => builder.query(&endpoint.query_params()),
            _ => builder.form(&endpoint.form_fields()),
        };

        let resp = builder.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CrmError::Http {
                status: status.as_u16(),
                body,
            });
        }

        debug!(endpoint = %path, "CRM request succeeded");
        endpoint.response_body(resp).await
    }

    /// Two-step file upload (§4.2, §6): call `attachRecord` to obtain an `uploadUrl`,
    /// then multipart-POST the file there.
    pub async fn upload_recording(&self, call_id: &str, file_path: &Path) -> Result<()> {
        if !file_path.exists() {
            return Err(CrmError::MissingRecording(file_path.display().to_string()));
        }
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let url = self.url_for("telephony.externalCall.attachRecord");
        let resp = self
            .inner
            .post(&url)
            .form(&[("CALL_ID", call_id), ("FILENAME", file_name.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CrmError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().await?;
        let upload_url = body
            .get("result")
            .and_then(|r| r.get("uploadUrl"))
            .and_then(Value::as_str)
            .ok_or(CrmError::MissingUploadUrl)?
            .to_string();

        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| CrmError::MissingRecording(e.to_string()))?;
        let part = Part::bytes(bytes).file_name(file_name);
        let form = Form::new().part("file", part);

        let upload_resp = self.inner.post(&upload_url).multipart(form).send().await?;
        if !upload_resp.status().is_success() {
            let status = upload_resp.status().as_u16();
            let body = upload_resp.text().await.unwrap_or_default();
            return Err(CrmError::Http { status, body });
        }

        Ok(())
    }

}

/// Extracts the `result` payload from a standard CRM JSON envelope, or turns an
/// absent `result` into the K2 semantic-error case (§7).
pub async fn extract_result(resp: reqwest::Response) -> Result<Value> {
    let body: Value = resp.json().await?;
    match body.get("result") {
        Some(result) => Ok(result.clone()),
        None => {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let description = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Err(CrmError::Semantic { error, description })
        }
    }
}
