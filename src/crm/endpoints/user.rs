use crate::crm::client::extract_result;
use crate::crm::endpoint::{Endpoint, Result};
use reqwest::{Method, Response};
use serde::Deserialize;
use std::collections::HashMap;

/// `user.get` filtered by internal extension, grounded on
/// `Bitrix24._get_user_id_by_internal_number`.
pub struct FindUserByInternalExtension {
    pub internal_extension: String,
}

#[derive(Deserialize)]
struct UserSummary {
    #[serde(rename = "ID")]
    id: String,
}

impl Endpoint for FindUserByInternalExtension {
    type ResponseBody = Option<String>;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &str {
        "user.get"
    }

    fn query_params(&self) -> Vec<(String, String)> {
        vec![(
            "filter[UF_PHONE_INNER]".to_string(),
            self.internal_extension.clone(),
        )]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        let users: Vec<UserSummary> = serde_json::from_value(result)?;
        Ok(users.into_iter().next().map(|u| u.id))
    }
}

/// `userfield.enumeration.get`, grounded on `Bitrix24._get_list_field_values`.
pub struct ListFieldValues {
    pub field_id: String,
}

#[derive(Deserialize)]
struct FieldValue {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "VALUE")]
    value: String,
}

impl Endpoint for ListFieldValues {
    type ResponseBody = HashMap<String, String>;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &str {
        "userfield.enumeration.get"
    }

    fn query_params(&self) -> Vec<(String, String)> {
        vec![("FIELD_ID".to_string(), self.field_id.clone())]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        let values: Vec<FieldValue> = serde_json::from_value(result)?;
        Ok(values.into_iter().map(|v| (v.id, v.value)).collect())
    }
}
