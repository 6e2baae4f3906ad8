// SPDX-License-Identifier: Apache-2.0

//! Credential redaction
//!
//! Connection requests may carry inline service-account JSON. It is wrapped
//! in [`Sensitive`] as soon as it is deserialized, so logging or
//! serializing a `ConnectionExtra` only ever shows a placeholder.

use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Shown by `{:?}` and `{}`.
const REDACTED: &str = "[REDACTED]";
/// Written in place of the value when serialized.
const MASK: &str = "***";

/// Credential material read from a request. `expose()` is the only way back
/// to the value and is reserved for handing it to a client library.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Display for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

// Serializing never needs the inner value, so no bound on `T`.
impl<T> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(MASK)
    }
}

// Requests deserialize the plain value.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ConnectionExtra;

    #[test]
    fn test_redacted_when_formatted() {
        let secret = Sensitive::new(r#"{"private_key": "abc"}"#.to_string());
        assert_eq!(format!("{:?}", secret), REDACTED);
        assert_eq!(format!("{}", secret), REDACTED);
        assert!(secret.expose().contains("private_key"));
    }

    #[test]
    fn test_request_value_kept_for_client() {
        let secret: Sensitive<String> = serde_json::from_str(r#""{\"type\": \"service_account\"}""#).unwrap();
        assert_eq!(secret.expose(), r#"{"type": "service_account"}"#);
        assert_eq!(serde_json::to_string(&secret).unwrap(), format!("\"{MASK}\""));
    }

    #[test]
    fn test_extra_never_echoes_credentials() {
        let extra: ConnectionExtra = serde_json::from_str(
            r#"{"user_or_service_auth_json": "{\"private_key\": \"abc\"}", "project": "p1"}"#,
        )
        .unwrap();
        let json = serde_json::to_string(&extra).unwrap();
        assert!(!json.contains("private_key"));
        assert!(json.contains("\"***\""));
        assert!(!format!("{extra:?}").contains("private_key"));
    }
}
