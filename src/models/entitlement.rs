use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entitlement {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub granted_at: DateTime<Utc>,
}

/// One page of a user's entitlements, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementPage {
    pub records: Vec<Entitlement>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl EntitlementPage {
    pub fn total_pages(&self) -> u32 {
        if self.total <= 0 || self.page_size == 0 {
            return 1;
        }
        let pages = (self.total as u64).div_ceil(self.page_size as u64);
        pages.max(1) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Grant,
    Revoke,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Grant => "grant",
            AuditAction::Revoke => "revoke",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grant" => Ok(AuditAction::Grant),
            "revoke" => Ok(AuditAction::Revoke),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub action: AuditAction,
    pub reason: Option<String>,
    pub actor_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: i64,
    pub product_id: i64,
    pub action: AuditAction,
    pub reason: Option<String>,
    pub actor_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_parsing() {
        assert_eq!("grant".parse::<AuditAction>(), Ok(AuditAction::Grant));
        assert_eq!("revoke".parse::<AuditAction>(), Ok(AuditAction::Revoke));
        assert!("delete".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_total_pages() {
        let page = EntitlementPage {
            records: vec![],
            total: 41,
            page: 1,
            page_size: 20,
        };
        assert_eq!(page.total_pages(), 3);

        let empty = EntitlementPage {
            records: vec![],
            total: 0,
            page: 1,
            page_size: 20,
        };
        assert_eq!(empty.total_pages(), 1);
    }
}
