use crate::crm::error::CrmError;
use reqwest::{Method, Response};

pub type Result<T> = std::result::Result<T, CrmError>;

/// One verb of the CRM's HTTP webhook protocol. Mirrors the ElevenLabs client's
/// `Endpoint` trait: each verb names its HTTP method, the form/query body it sends,
/// and how to turn a 2xx `Response` into its typed result.
#[allow(async_fn_in_trait)]
pub trait Endpoint {
    type ResponseBody;

    fn method(&self) -> Method;

    /// Path relative to the webhook base, e.g. `"crm.lead.add"`.
    fn path(&self) -> &str;

    /// `GET` query parameters. Bitrix24-style multi-valued keys
    /// (`filter[PHONE]`, `select[]`) are encoded as repeated pairs.
    fn query_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// `POST` form fields (`fields[KEY]` / `fields[KEY][][VALUE]` encoding is the
    /// caller's responsibility, matching how the original builds `post_data`).
    fn form_fields(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody>;
}

/// A two-step file upload: first an `Endpoint` call returns an `uploadUrl`, then the
/// file is POSTed there directly (see `CrmClient::upload_recording`).
pub struct AttachRecordUpload {
    pub call_id: String,
    pub file_name: String,
}
