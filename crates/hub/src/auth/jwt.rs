// Credential verification for inbound connections.
//
// The hub never issues real credentials; the authentication service does.
// It only verifies an already-issued HS256 bearer token and extracts the
// connection identity. Verification happens before the WebSocket upgrade,
// so a rejected token never creates registry, room, or presence state.

use anyhow::{bail, Context};
use collabspace_common::types::Identity;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const IDENTITY_TOKEN_TTL_SECONDS: i64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityClaims {
    sub: String,
    name: String,
    email: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct JwtIdentityVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Validate a bearer token and extract the connection identity.
    pub fn verify(&self, token: &str) -> anyhow::Result<Identity> {
        let claims = decode::<IdentityClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode identity token")?
            .claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .with_context(|| format!("identity token subject '{}' is not a UUID", claims.sub))?;

        Ok(Identity { user_id, display_name: claims.name, email: claims.email })
    }

    /// Issue a token for the given identity. Used by tests and local tooling;
    /// production tokens come from the authentication service with the same
    /// claim shape.
    pub fn issue(&self, identity: &Identity) -> anyhow::Result<String> {
        self.issue_at(identity, current_unix_timestamp()?)
    }

    fn issue_at(&self, identity: &Identity, issued_at: i64) -> anyhow::Result<String> {
        let claims = IdentityClaims {
            sub: identity.user_id.to_string(),
            name: identity.display_name.clone(),
            email: identity.email.clone(),
            iat: issued_at,
            exp: issued_at + IDENTITY_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode identity token")
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before unix epoch")?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}
