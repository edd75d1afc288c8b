//! Account events: one variant per event name.
//!
//! The variant picks the `name` column; the inner struct serializes to the
//! `payload` column with camelCase keys.

use ledgerline_events::{EventLike, StoreError};
use serde::{Deserialize, Serialize};

use crate::state::AccountStatus;

pub const ACCOUNT_CREATED: &str = "AccountCreated";
pub const ACCOUNT_CREDITED: &str = "AccountCredited";
pub const ACCOUNT_DEBITED: &str = "AccountDebited";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCreated {
    pub account_id: String,
    pub holder_name: String,
    pub status: AccountStatus,
    pub currency: String,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCredited {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDebited {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    Created(AccountCreated),
    Credited(AccountCredited),
    Debited(AccountDebited),
}

impl EventLike for AccountEvent {
    fn name(&self) -> &str {
        match self {
            AccountEvent::Created(_) => ACCOUNT_CREATED,
            AccountEvent::Credited(_) => ACCOUNT_CREDITED,
            AccountEvent::Debited(_) => ACCOUNT_DEBITED,
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            AccountEvent::Created(p) => serde_json::to_value(p),
            AccountEvent::Credited(p) => serde_json::to_value(p),
            AccountEvent::Debited(p) => serde_json::to_value(p),
        }
    }

    fn from_parts(
        entity_name: &str,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<Self, StoreError> {
        let event = match name {
            ACCOUNT_CREATED => AccountEvent::Created(serde_json::from_value(payload)?),
            ACCOUNT_CREDITED => AccountEvent::Credited(serde_json::from_value(payload)?),
            ACCOUNT_DEBITED => AccountEvent::Debited(serde_json::from_value(payload)?),
            other => {
                return Err(StoreError::UnknownEvent {
                    entity_name: entity_name.to_string(),
                    event_name: other.to_string(),
                })
            }
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payloads_use_camel_case_keys() {
        let event = AccountEvent::Created(AccountCreated {
            account_id: "123".into(),
            holder_name: "Jane Doe".into(),
            status: AccountStatus::Open,
            currency: "EUR".into(),
            balance: 0,
        });

        assert_eq!(event.name(), "AccountCreated");
        assert_eq!(
            event.to_payload().unwrap(),
            json!({
                "accountId": "123",
                "holderName": "Jane Doe",
                "status": "OPEN",
                "currency": "EUR",
                "balance": 0
            })
        );
    }

    #[test]
    fn decodes_stored_parts() {
        let event = AccountEvent::from_parts(
            "Account",
            "AccountDebited",
            json!({ "amount": 13, "currency": "EUR" }),
        )
        .unwrap();

        assert_eq!(
            event,
            AccountEvent::Debited(AccountDebited {
                amount: 13,
                currency: "EUR".into()
            })
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = AccountEvent::from_parts("Account", "AccountClosed", json!({})).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnknownEvent { ref event_name, .. } if event_name == "AccountClosed"
        ));
    }

    #[test]
    fn malformed_payload_is_a_serialization_error() {
        let err = AccountEvent::from_parts("Account", "AccountCredited", json!({ "amount": "x" }))
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
