use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backend::{single, Query, TableStore};
use crate::error::{BackendError, ServiceError};

pub const PROFILES_TABLE: &str = "user_profiles";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Victim,
    Volunteer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Victim => "victim",
            Role::Volunteer => "volunteer",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "victim" => Some(Role::Victim),
            "volunteer" => Some(Role::Volunteer),
            _ => None,
        }
    }

    /// The role a switch moves to. An unset role switches to `Victim`.
    pub fn toggled(current: Option<Role>) -> Role {
        match current {
            Some(Role::Victim) => Role::Volunteer,
            _ => Role::Victim,
        }
    }

    pub fn label(role: Option<Role>) -> &'static str {
        match role {
            Some(Role::Victim) => "Help Seeker",
            Some(Role::Volunteer) => "Volunteer Helper",
            None => "Community Member",
        }
    }

    pub fn dashboard_path(self) -> &'static str {
        match self {
            Role::Victim => "/victim-dashboard",
            Role::Volunteer => "/volunteer-dashboard",
        }
    }
}

/// Read-only aggregates maintained outside this service.
///
/// Other writers fill this column, so every field decodes leniently and falls
/// back on its own instead of failing the whole profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    #[serde(default, deserialize_with = "saturating_count")]
    pub total_alerts: u32,
    #[serde(default, deserialize_with = "display_text")]
    pub response_time: Option<String>,
    #[serde(default, deserialize_with = "percentage")]
    pub trust_score: u8,
}

impl ProfileStats {
    pub fn response_time_display(&self) -> &str {
        self.response_time.as_deref().unwrap_or("N/A")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "role_or_unset")]
    pub role: Option<Role>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub verified: bool,
    #[serde(default, deserialize_with = "lenient_stats")]
    pub stats: ProfileStats,
}

impl Profile {
    pub fn role_label(&self) -> &'static str {
        Role::label(self.role)
    }

    /// Heading for `stats.total_alerts`.
    pub fn alerts_caption(&self) -> &'static str {
        match self.role {
            Some(Role::Victim) => "Alerts Sent",
            _ => "Responses",
        }
    }
}

fn role_or_unset<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Role>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(Role::parse))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A number, or a string holding one.
fn loose_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn saturating_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    let count = raw.as_ref().and_then(loose_number).unwrap_or(0.0);
    Ok(count.floor().clamp(0.0, u32::MAX as f64) as u32)
}

fn percentage<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    let score = raw.as_ref().and_then(loose_number).unwrap_or(0.0);
    Ok(score.clamp(0.0, 100.0).round() as u8)
}

fn display_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
        _ => None,
    })
}

fn lenient_stats<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ProfileStats, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(v @ Value::Object(_)) => serde_json::from_value(v).unwrap_or_default(),
        _ => ProfileStats::default(),
    })
}

/// Partial profile update. Only `Some` fields are sent.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }
}

/// The personal information form as the user edits it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalInfoForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

impl PersonalInfoForm {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            name: profile.full_name.clone().unwrap_or_default(),
            email: profile.email.clone().unwrap_or_default(),
            phone: profile.phone.clone().unwrap_or_default(),
            address: profile.address.clone().unwrap_or_default(),
        }
    }

    /// The update this form submits. Email is managed by the auth provider
    /// and is never part of it.
    pub fn into_update(self) -> ProfileUpdate {
        ProfileUpdate {
            full_name: Some(self.name),
            phone: Some(self.phone),
            address: Some(self.address),
            ..Default::default()
        }
    }
}

pub struct ProfileRepository<'a, S: TableStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TableStore + ?Sized> ProfileRepository<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Loads the profile for `identity_id`.
    ///
    /// Absent or empty ids return `None` without touching storage. Storage
    /// failures are logged and also come back as `None`.
    pub async fn fetch(&self, identity_id: Option<&str>) -> Option<Profile> {
        let id = identity_id.filter(|id| !id.is_empty())?;
        let query = Query::from(PROFILES_TABLE).eq("id", id);

        let row = match self.store.select(&query).await.and_then(single) {
            Ok(row) => row,
            Err(BackendError::NoRows) => {
                debug!(user_id = %id, "no profile found");
                return None;
            }
            Err(e) => {
                error!(user_id = %id, error = %e, "Error fetching user profile");
                return None;
            }
        };

        match serde_json::from_value(row) {
            Ok(profile) => Some(profile),
            Err(e) => {
                error!(user_id = %id, error = %e, "Error decoding user profile");
                None
            }
        }
    }

    /// Applies `changes` and returns the stored record. An empty id
    /// short-circuits to `Ok(None)`.
    pub async fn update(
        &self,
        identity_id: &str,
        changes: &ProfileUpdate,
    ) -> Result<Option<Profile>, ServiceError> {
        if identity_id.is_empty() {
            return Ok(None);
        }
        let query = Query::from(PROFILES_TABLE).eq("id", identity_id);
        let patch =
            serde_json::to_value(changes).map_err(|e| ServiceError::Storage(e.into()))?;

        let rows = match self.store.update(&query, patch).await {
            Ok(rows) if !rows.is_empty() => rows,
            Ok(_) => return Err(self.update_failed(identity_id, BackendError::NoRows)),
            Err(e) => return Err(self.update_failed(identity_id, e)),
        };
        crate::metrics::record_profile_update(true);

        // The row is written from here on; a bad read-back must not look unsaved.
        let decoded = single(rows)
            .and_then(|row| serde_json::from_value::<Profile>(row).map_err(BackendError::from));
        match decoded {
            Ok(profile) => {
                info!(user_id = %identity_id, "user profile updated");
                Ok(Some(profile))
            }
            Err(e) => {
                warn!(user_id = %identity_id, error = %e, "user profile updated but could not be read back");
                Err(ServiceError::SavedUnreadable(e))
            }
        }
    }

    fn update_failed(&self, identity_id: &str, e: BackendError) -> ServiceError {
        error!(user_id = %identity_id, error = %e, "Error updating user profile");
        crate::metrics::record_profile_update(false);
        ServiceError::Storage(e)
    }

    pub async fn switch_role(
        &self,
        identity_id: &str,
        current: Option<Role>,
    ) -> Result<Option<Profile>, ServiceError> {
        self.update(identity_id, &ProfileUpdate::role(Role::toggled(current)))
            .await
    }

    pub async fn save_personal_info(
        &self,
        identity_id: &str,
        form: PersonalInfoForm,
    ) -> Result<Option<Profile>, ServiceError> {
        self.update(identity_id, &form.into_update()).await
    }
}
