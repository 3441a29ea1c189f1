// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Edge authentication boundary.
//!
//! Session credentials are issued elsewhere (OAuth login); the control plane
//! only verifies them, checks the platform-wide allow-list and knows where to
//! send unauthenticated callers.

use serde::{Deserialize, Serialize};

/// Identity decoded from a verified session credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthedUser {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

pub trait AuthService: Send + Sync {
    /// `None` for a missing, malformed, forged or expired credential.
    fn verify_credential(&self, token: &str) -> Option<AuthedUser>;

    fn is_platform_authorized(&self, user_id: &str) -> bool;

    /// Where to send a caller who must log in before reaching `return_url`.
    fn login_url(&self, return_url: &str) -> String;
}

/// A user may reach a private service only when they are on the platform
/// allow-list and, if the service names its own users, on that list too.
pub fn is_user_authorized(
    auth: &dyn AuthService,
    user_id: &str,
    service_authorized_users: Option<&[String]>,
) -> bool {
    if !auth.is_platform_authorized(user_id) {
        return false;
    }
    match service_authorized_users {
        None => true,
        Some(users) => users.iter().any(|u| u == user_id),
    }
}
