use crate::crm::client::extract_result;
use crate::crm::endpoint::{Endpoint, Result};
use crate::crm::types::ActivityBinding;
use reqwest::{Method, Response};

/// `crm.activity.binding.list`, grounded on `Bitrix24._call_binding`.
pub struct ListActivityBindings {
    pub activity_id: String,
}

impl Endpoint for ListActivityBindings {
    type ResponseBody = Vec<ActivityBinding>;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &str {
        "crm.activity.binding.list"
    }

    fn query_params(&self) -> Vec<(String, String)> {
        vec![("activityId".to_string(), self.activity_id.clone())]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        Ok(serde_json::from_value(result).unwrap_or_default())
    }
}

/// `crm.activity.binding.add`.
pub struct AddActivityBinding {
    pub activity_id: String,
    pub entity_type_id: u32,
    pub entity_id: String,
}

impl Endpoint for AddActivityBinding {
    type ResponseBody = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "crm.activity.binding.add"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("activityId".to_string(), self.activity_id.clone()),
            ("entityTypeId".to_string(), self.entity_type_id.to_string()),
            ("entityId".to_string(), self.entity_id.clone()),
        ]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        extract_result(resp).await?;
        Ok(())
    }
}

/// `crm.activity.binding.delete`.
pub struct DeleteActivityBinding {
    pub activity_id: String,
    pub entity_type_id: u32,
    pub entity_id: String,
}

impl Endpoint for DeleteActivityBinding {
    type ResponseBody = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &str {
        "crm.activity.binding.delete"
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("activityId".to_string(), self.activity_id.clone()),
            ("entityTypeId".to_string(), self.entity_type_id.to_string()),
            ("entityId".to_string(), self.entity_id.clone()),
        ]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        extract_result(resp).await?;
        Ok(())
    }
}
