use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::backend::{Order, Query, TableStore};
use crate::error::{BackendError, ServiceError};

pub const CONTACTS_TABLE: &str = "emergency_contacts";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub relationship: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

/// A contact as entered by the user, before storage assigns `id` and
/// `created_at`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEmergencyContact {
    pub name: String,
    pub relationship: String,
    pub phone: String,
}

impl NewEmergencyContact {
    pub fn new(
        name: impl Into<String>,
        relationship: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            relationship: relationship.into(),
            phone: phone.into(),
        }
    }

    /// Names the first blank required field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("relationship", &self.relationship),
            ("phone", &self.phone),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }

    fn to_row(&self, user_id: &str) -> Value {
        json!({
            "user_id": user_id,
            "name": self.name,
            "relationship": self.relationship,
            "phone": self.phone,
        })
    }
}

impl From<&EmergencyContact> for NewEmergencyContact {
    fn from(contact: &EmergencyContact) -> Self {
        Self::new(&contact.name, &contact.relationship, &contact.phone)
    }
}

fn decode_rows(rows: Vec<Value>) -> Result<Vec<EmergencyContact>, BackendError> {
    let mut contacts = rows
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<EmergencyContact>, _>>()?;
    contacts.sort_by_key(|c| c.created_at);
    Ok(contacts)
}

/// Reads and whole-set replaces a user's emergency contacts.
pub struct ContactSetReplacer<'a, S: TableStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TableStore + ?Sized> ContactSetReplacer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The user's contacts, oldest first. An empty id yields `None`. A storage
    /// failure is logged and yields an empty list.
    pub async fn list(&self, user_id: Option<&str>) -> Option<Vec<EmergencyContact>> {
        let user_id = user_id.filter(|id| !id.is_empty())?;
        let query = Query::from(CONTACTS_TABLE)
            .eq("user_id", user_id)
            .order("created_at", Order::Ascending);

        match self.store.select(&query).await.and_then(decode_rows) {
            Ok(contacts) => Some(contacts),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Error fetching emergency contacts");
                Some(Vec::new())
            }
        }
    }

    /// Replaces every stored contact of `user_id` with `contacts`.
    ///
    /// Deletes first, then inserts. The two steps are separate storage calls:
    /// a failed delete leaves the old set in place, while a failed insert
    /// leaves the user with no contacts and returns
    /// [`ServiceError::ContactsCleared`].
    pub async fn replace_all(
        &self,
        user_id: &str,
        contacts: Option<&[NewEmergencyContact]>,
    ) -> Result<Option<Vec<EmergencyContact>>, ServiceError> {
        let Some(contacts) = contacts.filter(|_| !user_id.is_empty()) else {
            return Ok(None);
        };

        if let Some((idx, field)) = contacts
            .iter()
            .enumerate()
            .find_map(|(idx, c)| c.missing_field().map(|f| (idx, f)))
        {
            return Err(ServiceError::Validation(format!(
                "contact {} is missing {field}",
                idx + 1
            )));
        }

        let query = Query::from(CONTACTS_TABLE).eq("user_id", user_id);
        if let Err(e) = self.store.delete(&query).await {
            error!(user_id = %user_id, error = %e, "Error deleting existing contacts");
            crate::metrics::record_contact_replacement(false, "delete");
            return Err(ServiceError::Storage(e));
        }

        if contacts.is_empty() {
            info!(user_id = %user_id, "emergency contacts cleared");
            crate::metrics::record_contact_replacement(true, "none");
            return Ok(Some(Vec::new()));
        }

        let rows = contacts.iter().map(|c| c.to_row(user_id)).collect();
        let inserted = async {
            let stored = self.store.insert(CONTACTS_TABLE, rows).await?;
            decode_rows(stored)
        }
        .await;

        match inserted {
            Ok(saved) => {
                info!(user_id = %user_id, count = saved.len(), "emergency contacts replaced");
                crate::metrics::record_contact_replacement(true, "none");
                Ok(Some(saved))
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Error inserting new contacts; stored contact set is now empty"
                );
                crate::metrics::record_contact_replacement(false, "insert");
                Err(ServiceError::ContactsCleared(e))
            }
        }
    }
}
