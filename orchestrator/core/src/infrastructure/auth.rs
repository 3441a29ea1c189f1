// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

use crate::domain::auth::{AuthService, AuthedUser};

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    user: AuthedUser,
    iat: u64,
    exp: u64,
}

/// Session verifier for HS256 cookies issued by the login flow.
pub struct JwtAuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    authorized_users: HashSet<String>,
    login_url: Url,
    session_lifetime: Duration,
}

impl JwtAuthService {
    pub fn new(
        jwt_secret: &str,
        authorized_users: impl IntoIterator<Item = String>,
        login_url: &str,
        session_lifetime: Duration,
    ) -> Result<Self> {
        if jwt_secret.is_empty() {
            return Err(anyhow::anyhow!("jwt_secret must not be empty"));
        }
        let login_url =
            Url::parse(login_url).map_err(|e| anyhow::anyhow!("Invalid login URL '{}': {}", login_url, e))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            authorized_users: authorized_users.into_iter().collect(),
            login_url,
            session_lifetime,
        })
    }

    /// Sign a session token for `user`, valid for the configured lifetime.
    pub fn issue_token(&self, user: &AuthedUser) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let claims = SessionClaims {
            user: user.clone(),
            iat: now,
            exp: now + self.session_lifetime.as_secs(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }
}

impl AuthService for JwtAuthService {
    fn verify_credential(&self, token: &str) -> Option<AuthedUser> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims.user),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session credential");
                None
            }
        }
    }

    fn is_platform_authorized(&self, user_id: &str) -> bool {
        self.authorized_users.contains(user_id)
    }

    fn login_url(&self, return_url: &str) -> String {
        let mut url = self.login_url.clone();
        url.query_pairs_mut().append_pair("redirect_uri", return_url);
        url.to_string()
    }
}
