use crate::crm::client::extract_result;
use crate::crm::endpoint::{Endpoint, Result};
use crate::crm::types::{CrmEntity, EntityKind};
use reqwest::{Method, Response};

const TERMINAL_LEAD_STATUSES: [&str; 2] = ["CONVERTED", "JUNK"];

/// One `crm.<kind>.list` call as performed by `get_entities_info`: active-only,
/// newest first, deals require a contact id, leads exclude terminal statuses.
pub struct ListEntities {
    pub kind: EntityKind,
    pub request_path: String,
    pub contact_id: Option<String>,
    pub phone_number: Option<String>,
    pub uf_list_id: Option<String>,
}

impl ListEntities {
    /// `None` for deals when there is no contact id: the original never issues this
    /// request by phone number alone (`get_entities_info`).
    pub fn applicable(&self) -> bool {
        !(self.kind == EntityKind::Deal && self.contact_id.is_none())
    }
}

impl Endpoint for ListEntities {
    type ResponseBody = Vec<CrmEntity>;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &str {
        &self.request_path
    }

    fn query_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("filter[ACTIVE]".to_string(), "Y".to_string()),
            ("select[]".to_string(), "ID".to_string()),
            ("select[]".to_string(), "TITLE".to_string()),
            ("select[]".to_string(), "STATUS_ID".to_string()),
            ("select[]".to_string(), "CATEGORY_ID".to_string()),
            ("start".to_string(), "0".to_string()),
            ("order[DATE_CREATE]".to_string(), "DESC".to_string()),
        ];
        if let Some(uf) = &self.uf_list_id {
            params.push(("select[]".to_string(), uf.clone()));
        }
        if let Some(contact_id) = &self.contact_id {
            params.push(("filter[CONTACT_ID]".to_string(), contact_id.clone()));
        }
        if let Some(phone) = &self.phone_number {
            params.push(("filter[PHONE]".to_string(), phone.clone()));
        }
        match self.kind {
            EntityKind::Deal => params.push(("filter[CLOSED]".to_string(), "N".to_string())),
            EntityKind::Lead => {
                for status in TERMINAL_LEAD_STATUSES {
                    params.push(("filter[!STATUS_ID]".to_string(), status.to_string()));
                }
            }
            _ => {}
        }
        params
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        let mut entities: Vec<CrmEntity> = serde_json::from_value(result)?;
        if self.kind == EntityKind::Lead {
            entities.retain(|e| {
                e.status_id
                    .as_deref()
                    .map_or(true, |s| !TERMINAL_LEAD_STATUSES.contains(&s))
            });
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deal_lookup_without_contact_id_is_not_applicable() {
        let list = ListEntities {
            kind: EntityKind::Deal,
            request_path: "crm.deal.list".to_string(),
            contact_id: None,
            phone_number: Some("+1000".to_string()),
            uf_list_id: None,
        };
        assert!(!list.applicable());
    }

    #[test]
    fn lead_lookup_is_always_applicable() {
        let list = ListEntities {
            kind: EntityKind::Lead,
            request_path: "crm.lead.list".to_string(),
            contact_id: None,
            phone_number: Some("+1000".to_string()),
            uf_list_id: None,
        };
        assert!(list.applicable());
    }
}
