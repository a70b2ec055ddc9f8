use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Owner,
    Admin,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    PropFirm,
    Personal,
    Funded,
    Demo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Archived,
}

/// Account row as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub broker_name: Option<String>,
    pub currency: String,
    pub starting_balance: f64,
    #[serde(default)]
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

/// Membership row joined with its account: `{account_id, role, account}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountMembership {
    pub account_id: String,
    pub role: AccountRole,
    pub account: AccountRecord,
}

/// An account the signed-in user can trade under, flattened with their role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub role: AccountRole,
    pub account_type: AccountType,
    pub broker_name: Option<String>,
    pub currency: String,
    pub starting_balance: f64,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl From<AccountMembership> for Account {
    fn from(membership: AccountMembership) -> Self {
        let AccountMembership { role, account, .. } = membership;
        Self {
            id: account.id,
            name: account.name,
            role,
            account_type: account.account_type,
            broker_name: account.broker_name,
            currency: account.currency,
            starting_balance: account.starting_balance,
            status: account.status,
            created_at: account.created_at,
        }
    }
}

/// Profile fragment persisting the last selected account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSelection {
    pub selected_account_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_record_flattens_into_account() {
        let json = serde_json::json!({
            "account_id": "acc-1",
            "role": "owner",
            "account": {
                "id": "acc-1",
                "name": "FTMO 100k",
                "type": "prop_firm",
                "broker_name": "FTMO",
                "currency": "USD",
                "starting_balance": 100000.0,
                "status": "active",
                "created_at": "2024-01-01T00:00:00Z"
            }
        });

        let membership: AccountMembership = serde_json::from_value(json).unwrap();
        let account = Account::from(membership);

        assert_eq!(account.id, "acc-1");
        assert_eq!(account.role, AccountRole::Owner);
        assert_eq!(account.account_type, AccountType::PropFirm);
        assert_eq!(account.starting_balance, 100000.0);
    }
}
