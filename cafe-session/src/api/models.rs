use serde::{Deserialize, Serialize};

/// The authenticated user's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    pub phone_number: String,
    #[serde(default)]
    pub created_at: String,
}

impl Session {
    /// "name surname", or the phone number when neither is known.
    pub fn display_name(&self) -> String {
        let full = [self.name.as_deref(), self.surname.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.phone_number.clone()
        } else {
            full
        }
    }
}

/// Registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterData {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    pub phone_number: String,
    pub provider: String,
    pub provider_id: String,
}

/// Registration response. Tokens are also set as cookies and are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub user: Session,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
