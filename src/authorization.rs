//! Read/delete authorization for document records.
//!
//! Rules, checked in order:
//! 1. Approved admin → every document
//! 2. Owner → their own documents
//! 3. Default → DENY
//!
//! A pending or rejected admin is treated like any other user.

use serde::{Deserialize, Serialize};

use crate::models::enums::{AccountStatus, UserRole};

/// The caller on whose behalf documents are read, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: String,
    pub role: UserRole,
    pub status: AccountStatus,
}

impl Viewer {
    pub fn new(user_id: &str, role: UserRole, status: AccountStatus) -> Self {
        Self {
            user_id: user_id.to_string(),
            role,
            status,
        }
    }

    /// An approved, non-admin user.
    pub fn user(user_id: &str) -> Self {
        Self::new(user_id, UserRole::User, AccountStatus::Approved)
    }

    /// Elevated read access: admin role AND approved account.
    pub fn can_view_all(&self) -> bool {
        self.role == UserRole::Admin && self.status == AccountStatus::Approved
    }

    pub fn can_view(&self, owner_id: &str) -> bool {
        self.can_view_all() || self.user_id == owner_id
    }

    pub fn can_delete(&self, owner_id: &str) -> bool {
        self.can_view(owner_id)
    }
}
