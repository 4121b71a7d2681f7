//! Optional OIDC identity bridge: `.well-known` discovery, JWKS-based
//! ID-token verification, nonce replay check, userinfo `sub` cross-check.
//! Default implementation is `Disabled` so the rest of the server never
//! has to special-case an unconfigured provider.

use crate::config::OidcConfig;
use crate::error::{AppError, AppResult};
use serde::Deserialize;
use std::time::Duration;

pub struct ExternalIdentity {
    pub subject: String,
    pub username: String,
    pub nickname: String,
}

#[rocket::async_trait]
pub trait IdentityBridge: Send + Sync {
    fn enabled(&self) -> bool;
    fn provider_name(&self) -> &str;
    async fn authorize_url(&self, state: &str, nonce: &str) -> AppResult<String>;
    async fn handle_callback(&self, code: &str, nonce: &str) -> AppResult<ExternalIdentity>;
}

pub struct Disabled;

#[rocket::async_trait]
impl IdentityBridge for Disabled {
    fn enabled(&self) -> bool {
        false
    }
    fn provider_name(&self) -> &str {
        "disabled"
    }
    async fn authorize_url(&self, _state: &str, _nonce: &str) -> AppResult<String> {
        Err(AppError::External("OIDC is not enabled on this server".into()))
    }
    async fn handle_callback(&self, _code: &str, _nonce: &str) -> AppResult<ExternalIdentity> {
        Err(AppError::External("OIDC is not enabled on this server".into()))
    }
}

#[derive(Deserialize)]
struct DiscoveryDoc {
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    jwks_uri: Option<String>,
}

#[derive(Deserialize)]
struct Jwks {
    keys: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

pub struct OidcBridge {
    config: OidcConfig,
    http: reqwest::Client,
}

impl OidcBridge {
    pub fn new(config: OidcConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build OIDC HTTP client");
        Self { config, http }
    }

    async fn discover(&self) -> AppResult<(String, String, Option<String>, String)> {
        if let (Some(a), Some(t), Some(j)) = (&self.config.authorize_url, &self.config.token_url, &self.config.jwks_url) {
            return Ok((a.clone(), t.clone(), self.config.userinfo_url.clone(), j.clone()));
        }
        let issuer = self
            .config
            .issuer_url
            .as_ref()
            .ok_or_else(|| AppError::External("OIDC issuer_url not configured".into()))?;
        let url = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));
        let doc: DiscoveryDoc = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::External(format!("OIDC discovery failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::External(format!("OIDC discovery response invalid: {e}")))?;
        let authorize = self.config.authorize_url.clone().or(doc.authorization_endpoint).ok_or_else(|| AppError::External("no authorization_endpoint".into()))?;
        let token = self.config.token_url.clone().or(doc.token_endpoint).ok_or_else(|| AppError::External("no token_endpoint".into()))?;
        let userinfo = self.config.userinfo_url.clone().or(doc.userinfo_endpoint);
        let jwks = self.config.jwks_url.clone().or(doc.jwks_uri).ok_or_else(|| AppError::External("no jwks_uri".into()))?;
        Ok((authorize, token, userinfo, jwks))
    }

    async fn verify_id_token(&self, id_token: &str, jwks_url: &str, expected_nonce: &str) -> AppResult<IdTokenClaims> {
        let header = jsonwebtoken::decode_header(id_token).map_err(|e| AppError::External(format!("invalid id_token header: {e}")))?;
        let kid = header.kid.ok_or_else(|| AppError::External("id_token missing kid".into()))?;
        let jwks: Jwks = self
            .http
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| AppError::External(format!("jwks fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::External(format!("jwks response invalid: {e}")))?;
        let key = jwks
            .keys
            .into_iter()
            .find(|k| k.get("kid").and_then(|v| v.as_str()) == Some(kid.as_str()))
            .ok_or_else(|| AppError::External("no matching jwks key".into()))?;
        let decoding_key = jsonwebtoken::DecodingKey::from_jwk(&serde_json::from_value(key).map_err(|e| AppError::External(e.to_string()))?)
            .map_err(|e| AppError::External(format!("invalid jwk: {e}")))?;
        let mut validation = jsonwebtoken::Validation::new(header.alg);
        validation.set_audience(&[self.config.client_id.clone()]);
        let data = jsonwebtoken::decode::<IdTokenClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| AppError::External(format!("id_token signature invalid: {e}")))?;
        if data.claims.nonce.as_deref() != Some(expected_nonce) {
            return Err(AppError::External("id_token nonce mismatch".into()));
        }
        Ok(data.claims)
    }
}

#[rocket::async_trait]
impl IdentityBridge for OidcBridge {
    fn enabled(&self) -> bool {
        true
    }
    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }

    async fn authorize_url(&self, state: &str, nonce: &str) -> AppResult<String> {
        let (authorize, _, _, _) = self.discover().await?;
        Ok(format!(
            "{authorize}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={state}&nonce={nonce}",
            urlencode(&self.config.client_id),
            urlencode(&self.config.redirect_uri),
            urlencode(&self.config.scope),
        ))
    }

    async fn handle_callback(&self, code: &str, nonce: &str) -> AppResult<ExternalIdentity> {
        let (_, token_url, userinfo_url, jwks_url) = self.discover().await?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let token_res: TokenResponse = self
            .http
            .post(&token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::External(format!("token exchange failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::External(format!("token response invalid: {e}")))?;

        let claims = self.verify_id_token(&token_res.id_token, &jwks_url, nonce).await?;

        // Cross-check userinfo sub against id-token sub when the provider exposes one.
        let (username, nickname) = if let (Some(userinfo_url), Some(access_token)) = (userinfo_url, token_res.access_token) {
            let info: UserInfo = self
                .http
                .get(&userinfo_url)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| AppError::External(format!("userinfo fetch failed: {e}")))?
                .json()
                .await
                .map_err(|e| AppError::External(format!("userinfo response invalid: {e}")))?;
            if info.sub != claims.sub {
                return Err(AppError::External("userinfo sub does not match id_token sub".into()));
            }
            (info.preferred_username.or(claims.preferred_username), info.name.or(claims.name))
        } else {
            (claims.preferred_username.clone(), claims.name.clone())
        };

        Ok(ExternalIdentity {
            subject: claims.sub,
            username: username.unwrap_or_else(|| format!("sso_{}", &uuid::Uuid::new_v4().simple().to_string()[..8])),
            nickname: nickname.unwrap_or_else(|| "SSO User".to_string()),
        })
    }
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}
