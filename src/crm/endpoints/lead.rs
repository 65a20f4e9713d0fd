use crate::crm::client::extract_result;
use crate::crm::endpoint::{Endpoint, Result};
use reqwest::{Method, Response};
use serde::Deserialize;

/// `crm.lead.get`, used by `_change_lead_title` to fetch the current title before
/// prepending the queue name.
pub struct GetLead {
    pub lead_id: String,
}

#[derive(Deserialize)]
pub struct LeadSummary {
    #[serde(rename = "TITLE")]
    pub title: String,
}

impl Endpoint for GetLead {
    type ResponseBody = LeadSummary;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &str {
        "crm.lead.get"
    }

    fn query_params(&self) -> Vec<(String, String)> {
        vec![("id".to_string(), self.lead_id.clone())]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Required fields for `crm.lead.add`, matching `_create_lead`'s `required_fields`
/// check.
pub struct NewLead {
    pub title: String,
    pub phone: String,
    pub source_description: String,
    pub lead_target_field_id: String,
    pub lead_target_value: String,
    pub contact_id: Option<String>,
}

/// `crm.lead.add`, grounded on `Bitrix24._create_lead`. The phone number is
/// multi-valued per the CRM's contact-field convention
/// (`fields[PHONE][][VALUE]`/`fields[PHONE][][VALUE_TYPE]`).
pub struct CreateLead(pub NewLead);

impl Endpoint for CreateLead {
    type ResponseBody = String;

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "crm.lead.add"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        let lead = &self.0;
        let mut fields = vec![
            ("fields[STATUS_ID]".to_string(), "NEW".to_string()),
            ("fields[TITLE]".to_string(), lead.title.clone()),
            ("fields[PHONE][][VALUE]".to_string(), lead.phone.clone()),
            (
                "fields[PHONE][][VALUE_TYPE]".to_string(),
                "MOBILE".to_string(),
            ),
            ("fields[SOURCE_ID]".to_string(), "CALL".to_string()),
            (
                "fields[SOURCE_DESCRIPTION]".to_string(),
                lead.source_description.clone(),
            ),
            (
                format!("fields[{}]", lead.lead_target_field_id),
                lead.lead_target_value.clone(),
            ),
        ];
        if let Some(contact_id) = &lead.contact_id {
            fields.push(("fields[CONTACT_ID]".to_string(), contact_id.clone()));
        }
        fields
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// `crm.lead.update`, grounded on `Bitrix24._change_lead_title` /
/// `Bitrix24._update_entity`.
pub struct UpdateLead {
    pub lead_id: String,
    pub fields: Vec<(String, String)>,
}

impl Endpoint for UpdateLead {
    type ResponseBody = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "crm.lead.update"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("id".to_string(), self.lead_id.clone())];
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
