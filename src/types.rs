use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Identity-provider user identifier (OAuth `sub` claim).
///
/// Opaque to the client; Keycloak issues UUIDs but nothing here relies on it.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// JWK key identifier (`kid` header).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct KeyId(pub String);

/// Backend event identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct EventId(pub i64);

/// Which `resource_access` entry and role grant admin rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRule {
    pub resource: String,
    pub role: String,
}

impl RoleRule {
    #[must_use]
    pub fn new(resource: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            role: role.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_id_from_string() {
        let id = SubjectId::from("5b3c7a4e-0000-4000-8000-000000000001".to_string());
        assert_eq!(id.to_string(), "5b3c7a4e-0000-4000-8000-000000000001");
        assert_eq!(id.as_str(), id.0);
    }

    #[test]
    fn subject_id_serde_transparent() {
        let id: SubjectId = serde_json::from_str("\"user-1\"").unwrap();
        assert_eq!(id, SubjectId("user-1".into()));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user-1\"");
    }

    #[test]
    fn newtypes_prevent_mixing() {
        fn takes_subject(_: &SubjectId) {}
        fn takes_kid(_: &KeyId) {}

        takes_subject(&SubjectId::from("id".to_string()));
        takes_kid(&KeyId::from("id".to_string()));
        // takes_subject(&KeyId::from(...));  // Compile error!
    }
}
