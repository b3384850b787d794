use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ParticipantId;

/// Dashboard role attached to every session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Assigner,
    Employee,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Assigner => "assigner",
            Self::Employee => "employee",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "assigner" => Ok(Self::Assigner),
            "employee" => Ok(Self::Employee),
            _ => Err("unknown role"),
        }
    }
}

/// The caller's own identity, returned by the session bootstrap endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ParticipantId>,
    #[serde(alias = "name")]
    pub display_name: String,
    pub email: String,
    #[serde(deserialize_with = "deserialize_role")]
    pub role: Role,
}

fn deserialize_role<'de, D>(deserializer: D) -> Result<Role, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    // Some backends prefix authorities, e.g. `ROLE_ADMIN`.
    let trimmed = raw.strip_prefix("ROLE_").unwrap_or(&raw);
    trimmed.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    #[serde(alias = "accessToken", alias = "jwt")]
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Admin, Role::Assigner, Role::Employee] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("manager".parse::<Role>().is_err());
    }

    #[test]
    fn profile_accepts_backend_field_names() {
        let json = r#"{"id": 7, "name": "Dana Ortiz", "email": "dana@example.com", "role": "ROLE_ASSIGNER"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.id, Some(ParticipantId::new("7")));
        assert_eq!(profile.display_name, "Dana Ortiz");
        assert_eq!(profile.role, Role::Assigner);
    }

    #[test]
    fn profile_without_id() {
        let json = r#"{"displayName": "Sam", "email": "sam@example.com", "role": "employee"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert!(profile.id.is_none());
        assert_eq!(profile.role, Role::Employee);
    }

    #[test]
    fn login_response_accepts_token_aliases() {
        let response: LoginResponse = serde_json::from_str(r#"{"accessToken":"abc"}"#).unwrap();
        assert_eq!(response.token, "abc");
    }
}
