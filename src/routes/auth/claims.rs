use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::jwt::SignedClaims;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Invite,
}

/// Session claims carried by the `auth_token` cookie or a bearer header.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Claims {
    pub id: String,
    pub email: String,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub token_use: TokenUse,
}

impl Claims {
    pub fn access(user_id: Uuid, email: &str, exp: usize) -> Self {
        Self {
            id: user_id.to_string(),
            email: email.to_string(),
            exp,
            iss: String::new(),
            aud: String::new(),
            token_use: TokenUse::Access,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }
}

impl SignedClaims for Claims {
    fn stamp(&mut self, issuer: &str, audience: &str) {
        self.iss = issuer.to_owned();
        self.aud = audience.to_owned();
    }

    fn expires_at(&self) -> usize {
        self.exp
    }

    fn token_use(&self) -> &TokenUse {
        &self.token_use
    }
}

/// Claims of a workspace invitation. Only a pointer: the membership row stays authoritative.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InviteClaims {
    pub membership_id: Uuid,
    pub user_id: Option<Uuid>,
    pub workspace_id: Uuid,
    pub email: String,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub token_use: TokenUse,
}

impl InviteClaims {
    pub fn new(
        membership_id: Uuid,
        user_id: Option<Uuid>,
        workspace_id: Uuid,
        email: &str,
        exp: usize,
    ) -> Self {
        Self {
            membership_id,
            user_id,
            workspace_id,
            email: email.to_string(),
            exp,
            iss: String::new(),
            aud: String::new(),
            token_use: TokenUse::Invite,
        }
    }
}

impl SignedClaims for InviteClaims {
    fn stamp(&mut self, issuer: &str, audience: &str) {
        self.iss = issuer.to_owned();
        self.aud = audience.to_owned();
    }

    fn expires_at(&self) -> usize {
        self.exp
    }

    fn token_use(&self) -> &TokenUse {
        &self.token_use
    }
}
