use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub msisdn: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub addresses: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub msisdn: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub addresses: Vec<Value>,
}

/// Update request body. Absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub id: String,
    #[serde(default)]
    pub msisdn: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub addresses: Option<Vec<Value>>,
}

impl User {
    pub fn from_new(id: impl Into<String>, new: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            msisdn: new.msisdn,
            name: new.name,
            addresses: new.addresses,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the fields present in `update`.
    pub fn apply(&mut self, update: UpdateUser) {
        if let Some(msisdn) = update.msisdn {
            self.msisdn = msisdn;
        }
        if let Some(name) = update.name {
            self.name = Some(name);
        }
        if let Some(addresses) = update.addresses {
            self.addresses = addresses;
        }
        self.updated_at = Utc::now();
    }
}
