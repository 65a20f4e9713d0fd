use crate::crm::client::extract_result;
use crate::crm::endpoint::{Endpoint, Result};
use crate::crm::types::Contact;
use reqwest::{Method, Response};

/// `crm.contact.list` filtered by phone, grounded on `find_contact_by_phone`.
pub struct FindContactByPhone {
    pub phone_number: String,
}

impl Endpoint for FindContactByPhone {
    type ResponseBody = Vec<Contact>;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &str {
        "crm.contact.list"
    }

    fn query_params(&self) -> Vec<(String, String)> {
        vec![
            ("filter[PHONE]".to_string(), self.phone_number.clone()),
            ("select[]".to_string(), "ID".to_string()),
            ("select[]".to_string(), "NAME".to_string()),
            ("select[]".to_string(), "LAST_NAME".to_string()),
            ("select[]".to_string(), "SECOND_NAME".to_string()),
        ]
    }

    async fn response_body(self, resp: Response) -> Result<Self::ResponseBody> {
        let result = extract_result(resp).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Picks the contact with the most populated name fields, breaking ties by
/// first-returned (§4.3, P4).
pub fn select_best_contact(contacts: Vec<Contact>) -> Option<Contact> {
    contacts
        .into_iter()
        .enumerate()
        .max_by_key(|(idx, contact)| (contact.populated_name_fields(), std::cmp::Reverse(*idx)))
        .map(|(_, contact)| contact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: &str, name: Option<&str>, last: Option<&str>, second: Option<&str>) -> Contact {
        Contact {
            id: id.to_string(),
            name: name.map(str::to_string),
            last_name: last.map(str::to_string),
            second_name: second.map(str::to_string),
        }
    }

    #[test]
    fn picks_contact_with_most_populated_fields() {
        let contacts = vec![
            contact("1", Some("Jane"), None, None),
            contact("2", Some("Jane"), Some("Doe"), None),
            contact("3", None, None, None),
        ];
        let best = select_best_contact(contacts).unwrap();
        assert_eq!(best.id, "2");
    }

    #[test]
    fn ties_break_to_first_returned() {
        let contacts = vec![
            contact("1", Some("Jane"), Some("Doe"), None),
            contact("2", Some("John"), Some("Smith"), None),
        ];
        let best = select_best_contact(contacts).unwrap();
        assert_eq!(best.id, "1");
    }
}
