use crate::crm::client::extract_result;
use crate::crm::endpoint::{Endpoint, Result};
use crate::crm::types::{CallDirection, FinishedCall, RegisteredCall};
use reqwest::{Method, Response};

/// `telephony.externalcall.register`, grounded on `Bitrix24.b24call_registration`.
pub struct RegisterCall {
    pub user_id: String,
    pub phone_number: String,
    pub direction: CallDirection,
    pub line_number: String,
}

impl Endpoint for RegisterCall {
    type ResponseBody = RegisteredCall;

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "telephony.externalcall.register"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("USER_ID".to_string(), self.user_id.clone()),
            ("PHONE_NUMBER".to_string(), self.phone_number.clone()),
            (
                "TYPE".to_string(),
                self.direction.crm_type_code().to_string(),
            ),
            ("CRM_CREATE".to_string(), "1".to_string()),
            ("SHOW".to_string(), "0".to_string()),
            ("LINE_NUMBER".to_string(), self.line_number.clone()),
        ]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// `telephony.externalcall.show`, opens a call-window popup for one CRM user.
pub struct ShowCallWindow {
    pub call_id: String,
    pub user_id: String,
}

impl Endpoint for ShowCallWindow {
    type ResponseBody = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "telephony.externalcall.show"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("CALL_ID".to_string(), self.call_id.clone()),
            ("USER_ID".to_string(), self.user_id.clone()),
        ]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        extract_result(resp).await?;
        Ok(())
    }
}

/// `telephony.externalcall.hide`, closes a call-window popup for one CRM user.
pub struct HideCallWindow {
    pub call_id: String,
    pub user_id: String,
}

impl Endpoint for HideCallWindow {
    type ResponseBody = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "telephony.externalcall.hide"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("CALL_ID".to_string(), self.call_id.clone()),
            ("USER_ID".to_string(), self.user_id.clone()),
        ]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        extract_result(resp).await?;
        Ok(())
    }
}

/// `telephony.externalcall.finish`, grounded on `Bitrix24.cancel_b24call`.
pub struct FinishCall {
    pub call_id: String,
    pub user_id: String,
    pub duration_secs: i64,
}

impl Endpoint for FinishCall {
    type ResponseBody = FinishedCall;

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "telephony.externalcall.finish"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("CALL_ID".to_string(), self.call_id.clone()),
            ("USER_ID".to_string(), self.user_id.clone()),
            ("DURATION".to_string(), self.duration_secs.to_string()),
        ]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// `crm.activity.update`, used to mark the activity `COMPLETED=Y` once the
/// recording has been attached (§4.6 step 5).
pub struct UpdateActivity {
    pub activity_id: String,
    pub fields: Vec<(String, String)>,
}

impl Endpoint for UpdateActivity {
    type ResponseBody = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "crm.activity.update"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("id".to_string(), self.activity_id.clone())];
        for (key, value) in &self.fields {
            fields.push((format!("fields[{key}]"), value.clone()));
        }
        fields
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        extract_result(resp).await?;
        Ok(())
    }
}
