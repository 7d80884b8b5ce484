use serde::{Deserialize, Serialize};

/// Result of a login round trip.
///
/// Wire shape: `{"status": "Admin"}`, `{"status": "User"}` or
/// `{"status": "Fail", "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(tag = "status")]
pub enum LoginOutcome {
    Admin,
    User,
    Fail { error: String },
}

impl LoginOutcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        LoginOutcome::Fail {
            error: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, LoginOutcome::Fail { .. })
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, LoginOutcome::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_outcome_wire_shape() {
        assert_eq!(serde_json::to_value(LoginOutcome::Admin).unwrap(), json!({"status": "Admin"}));
        assert_eq!(
            serde_json::to_value(LoginOutcome::fail("bad password")).unwrap(),
            json!({"status": "Fail", "error": "bad password"})
        );

        let parsed: LoginOutcome = serde_json::from_value(json!({"status": "User"})).unwrap();
        assert_eq!(parsed, LoginOutcome::User);
        assert!(parsed.is_success());
        assert!(!parsed.is_admin());
    }
}
