//! Broker credential records as stored in a secret version

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Fields every credential record must carry as non-empty strings
const REQUIRED_FIELDS: [&str; 2] = ["username", "password"];

/// Fields that describe how to reach the broker rather than who to log in as.
/// They follow the live environment, so a stale record borrows them from a
/// fresher one before it is used.
pub const TRANSPORT_FIELDS: &[&str] = &["ssl"];

/// Errors from parsing a stored secret string
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Secret string is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Secret version has no string value")]
    MissingSecretString,

    #[error("Secret string is not a JSON object")]
    NotAnObject,

    #[error("{0} key is missing from secret JSON")]
    MissingField(&'static str),

    #[error("{0} key in secret JSON must be a string")]
    NotAString(&'static str),

    #[error("{0} key in secret JSON is empty")]
    EmptyField(&'static str),
}

/// A username/password pair plus whatever other keys the secret carries
#[derive(Clone, PartialEq)]
pub struct CredentialRecord {
    pub username: String,
    pub password: String,
    /// Remaining keys, preserved verbatim
    pub extra: Map<String, Value>,
}

impl CredentialRecord {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            extra: Map::new(),
        }
    }

    /// Parse and validate a secret string
    pub fn parse(secret_string: &str) -> Result<Self, CredentialError> {
        let Value::Object(mut map) = serde_json::from_str::<Value>(secret_string)? else {
            return Err(CredentialError::NotAnObject);
        };

        let [username, password] = REQUIRED_FIELDS.map(|field| take_required(&mut map, field));

        Ok(Self {
            username: username?,
            password: password?,
            extra: map,
        })
    }

    /// Serialize back into the stored JSON form
    pub fn to_secret_string(&self) -> String {
        let mut map = Map::with_capacity(self.extra.len() + 2);
        map.insert("username".to_string(), Value::String(self.username.clone()));
        map.insert("password".to_string(), Value::String(self.password.clone()));
        for (k, v) in &self.extra {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map).to_string()
    }

    /// Copy of this record with a different password
    #[must_use]
    pub fn with_password(&self, password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            ..self.clone()
        }
    }

    /// Replace this record's transport fields with those of `live`.
    ///
    /// A field absent from `live` is removed here as well.
    pub fn carry_transport_settings_from(&mut self, live: &CredentialRecord) {
        for field in TRANSPORT_FIELDS {
            self.extra.remove(*field);
            if let Some(value) = live.extra.get(*field) {
                self.extra.insert((*field).to_string(), value.clone());
            }
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("extra", &self.extra)
            .finish()
    }
}

fn take_required(map: &mut Map<String, Value>, field: &'static str) -> Result<String, CredentialError> {
    match map.remove(field) {
        Some(Value::String(s)) if s.is_empty() => Err(CredentialError::EmptyField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(CredentialError::NotAString(field)),
        None => Err(CredentialError::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_keeps_extra_fields() {
        let record =
            CredentialRecord::parse(r#"{"username":"svc","password":"old","ssl":true,"port":5671}"#)
                .unwrap();

        assert_eq!(record.username, "svc");
        assert_eq!(record.password, "old");
        assert_eq!(record.extra.get("ssl"), Some(&json!(true)));
        assert_eq!(record.extra.get("port"), Some(&json!(5671)));
        assert!(!record.extra.contains_key("username"));
    }

    #[test]
    fn test_parse_rejects_missing_and_empty_fields() {
        assert!(matches!(
            CredentialRecord::parse(r#"{"username":"svc"}"#),
            Err(CredentialError::MissingField("password"))
        ));
        assert!(matches!(
            CredentialRecord::parse(r#"{"username":"","password":"x"}"#),
            Err(CredentialError::EmptyField("username"))
        ));
        assert!(matches!(
            CredentialRecord::parse(r#"{"username":"svc","password":7}"#),
            Err(CredentialError::NotAString("password"))
        ));
        assert!(matches!(
            CredentialRecord::parse(r#"["svc","x"]"#),
            Err(CredentialError::NotAnObject)
        ));
        assert!(matches!(
            CredentialRecord::parse("not json"),
            Err(CredentialError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_secret_string_survives_parse() {
        let mut record = CredentialRecord::new("svc", "p@ss\"word");
        record.extra.insert("ssl".to_string(), json!(false));

        let parsed = CredentialRecord::parse(&record.to_secret_string()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_carry_transport_settings() {
        let mut current = CredentialRecord::new("svc", "cur");
        current.extra.insert("ssl".to_string(), json!(true));

        let mut previous = CredentialRecord::new("svc", "prev");
        previous.extra.insert("ssl".to_string(), json!(false));
        previous.extra.insert("note".to_string(), json!("kept"));

        previous.carry_transport_settings_from(&current);
        assert_eq!(previous.extra.get("ssl"), Some(&json!(true)));
        assert_eq!(previous.extra.get("note"), Some(&json!("kept")));

        // Absent on the live record means absent on the stale one too
        previous.carry_transport_settings_from(&CredentialRecord::new("svc", "x"));
        assert!(!previous.extra.contains_key("ssl"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let record = CredentialRecord::new("svc", "hunter2");
        let rendered = format!("{:?}", record);
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
    }
}
