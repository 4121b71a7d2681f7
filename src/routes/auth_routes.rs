//! Registration, login/logout, session introspection, password/account
//! management, and the optional OIDC bridge. Exempt from the session-token
//! and CSRF checks per the allowlist in `AppConfig`/`auth`.

use crate::auth::{self, AuthUser, ClientIp};
use crate::config::AppConfig;
use crate::crypto::{self, InstallSalt};
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::identity::IdentityBridge;
use crate::models::*;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::state_store::StateStore;
use crate::store;
use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::{get, post, put, Request, State};
use std::sync::Arc;
use std::time::Duration;

#[post("/api/register", format = "json", data = "<body>")]
pub fn register(
    db: &State<Db>,
    salt: &State<InstallSalt>,
    limiter: &State<RateLimiter>,
    rl_config: &State<RateLimitConfig>,
    ip: ClientIp,
    body: Json<RegisterRequest>,
) -> AppResult<Json<PublicUser>> {
    let rl = limiter.check_with_info(&format!("register:{}", ip.0), rl_config.register_max, rl_config.register_window_secs);
    if !rl.allowed {
        return Err(AppError::RateLimited { retry_after_secs: rl.retry_after_secs, limit: rl.limit });
    }

    let username = body.username.trim().to_string();
    if !crypto::validate_username(&username) {
        return Err(AppError::Validation("username must be 3-20 chars, letters/digits/underscore only".into()));
    }
    if !crypto::validate_password(&body.password) {
        return Err(AppError::Validation("password too short".into()));
    }
    let nickname = body.nickname.clone().filter(|n| !n.trim().is_empty()).unwrap_or_else(|| username.clone());
    let nickname = crypto::sanitize_input(&nickname, 100);

    let conn = db.conn.lock().unwrap();
    let hash = crypto::hash_password(&salt.0, &body.password);
    let user = store::users::create(&conn, &super::new_id(), &username, &hash, &nickname, &super::now())?;
    store::audit::log_access(&conn, Some(&user.id), "register", &ip.0, "", &super::now())?;
    Ok(Json(PublicUser::from(&user)))
}

#[post("/api/login", format = "json", data = "<body>")]
pub fn login(
    db: &State<Db>,
    salt: &State<InstallSalt>,
    limiter: &State<RateLimiter>,
    rl_config: &State<RateLimitConfig>,
    config: &State<AppConfig>,
    ip: ClientIp,
    cookies: &CookieJar<'_>,
    body: Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let rl = limiter.check_with_info(&format!("login:{}", ip.0), rl_config.login_max, rl_config.login_window_secs);
    if !rl.allowed {
        return Err(AppError::RateLimited { retry_after_secs: rl.retry_after_secs, limit: rl.limit });
    }

    let conn = db.conn.lock().unwrap();
    let user = store::users::get_by_username(&conn, body.username.trim())?
        .ok_or_else(|| AppError::Validation("invalid username or password".into()))?;

    match crypto::verify_password(&salt.0, &body.password, &user.password_hash) {
        crypto::VerifyOutcome::Rejected => return Err(AppError::Validation("invalid username or password".into())),
        crypto::VerifyOutcome::Accepted { needs_upgrade } => {
            if needs_upgrade {
                let upgraded = crypto::hash_password(&salt.0, &body.password);
                store::users::update_password_hash(&conn, &user.id, &upgraded)?;
            }
        }
    }

    let token = auth::random_token();
    store::users::rotate_session_token(&conn, &user.id, &token)?;
    store::audit::log_access(&conn, Some(&user.id), "login", &ip.0, "", &super::now())?;
    let csrf = auth::start_session(cookies, &user.id, &token, config.use_https);

    let refreshed = store::users::get_by_id(&conn, &user.id)?.unwrap();
    Ok(Json(LoginResponse { user: PublicUser::from(&refreshed), csrf_token: csrf }))
}

#[post("/api/logout")]
pub fn logout(db: &State<Db>, ip: ClientIp, cookies: &CookieJar<'_>, auth: AuthUser) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn.lock().unwrap();
    store::users::clear_session_token(&conn, &auth.0.id)?;
    store::audit::log_access(&conn, Some(&auth.0.id), "logout", &ip.0, "", &super::now())?;
    auth::clear_session(cookies);
    Ok(Json(serde_json::json!({"ok": true})))
}

#[get("/api/me")]
pub fn me(auth: Option<AuthUser>) -> Json<serde_json::Value> {
    match auth {
        Some(AuthUser(user)) => Json(serde_json::json!({"logged_in": true, "user": PublicUser::from(&user)})),
        None => Json(serde_json::json!({"logged_in": false})),
    }
}

#[get("/api/config")]
pub fn config_snapshot(config: &State<AppConfig>) -> Json<ConfigSnapshot> {
    Json(ConfigSnapshot {
        max_content_length: config.max_content_length,
        oidc_enabled: config.oidc_enabled(),
        av_scan_enabled: config.feature_av_scan_enabled,
    })
}

#[get("/api/auth/providers")]
pub fn auth_providers(config: &State<AppConfig>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "providers": if config.oidc_enabled() { vec![config.oidc.provider_name.clone()] } else { vec![] },
    }))
}

#[get("/auth/oidc/login")]
pub async fn oidc_login(
    config: &State<AppConfig>,
    bridge: &State<Arc<dyn IdentityBridge>>,
    state_store: &State<StateStore>,
) -> AppResult<rocket::response::Redirect> {
    if !config.oidc_enabled() {
        return Err(AppError::External("OIDC is not enabled on this server".into()));
    }
    let state = auth::random_token();
    let nonce = auth::random_token();
    state_store.set(&format!("oidc:state:{state}"), &nonce, Some(Duration::from_secs(600))).await;
    let url = bridge.authorize_url(&state, &nonce).await?;
    Ok(rocket::response::Redirect::to(url))
}

#[get("/auth/oidc/callback?<code>&<state>")]
pub async fn oidc_callback(
    db: &State<Db>,
    salt: &State<InstallSalt>,
    config: &State<AppConfig>,
    bridge: &State<Arc<dyn IdentityBridge>>,
    state_store: &State<StateStore>,
    cookies: &CookieJar<'_>,
    code: &str,
    state: &str,
) -> AppResult<rocket::response::Redirect> {
    // External failure: OIDC refuses login and redirects home rather than
    // surfacing a raw error to a browser navigation.
    let Some(nonce) = state_store.get_and_delete(&format!("oidc:state:{state}")).await else {
        return Ok(rocket::response::Redirect::to("/?oidc_error=1"));
    };
    let identity = match bridge.handle_callback(code, &nonce).await {
        Ok(i) => i,
        Err(_) => return Ok(rocket::response::Redirect::to("/?oidc_error=1")),
    };

    let conn = db.conn.lock().unwrap();
    let user_id = match store::sso::find_user_id(&conn, bridge.provider_name(), &identity.subject)? {
        Some(id) => id,
        None => {
            let mut username = identity.username.clone();
            if store::users::get_by_username(&conn, &username)?.is_some() {
                username = format!("{username}_{}", &uuid::Uuid::new_v4().simple().to_string()[..6]);
            }
            let random_password = auth::random_token();
            let hash = crypto::hash_password(&salt.0, &random_password);
            let user = store::users::create(&conn, &super::new_id(), &username, &hash, &identity.nickname, &super::now())?;
            store::sso::link(&conn, bridge.provider_name(), &identity.subject, &user.id)?;
            user.id
        }
    };

    let token = auth::random_token();
    store::users::rotate_session_token(&conn, &user_id, &token)?;
    auth::start_session(cookies, &user_id, &token, config.use_https);
    Ok(rocket::response::Redirect::to("/"))
}

#[put("/api/me/password", format = "json", data = "<body>")]
pub fn change_password(
    db: &State<Db>,
    salt: &State<InstallSalt>,
    config: &State<AppConfig>,
    ip: ClientIp,
    cookies: &CookieJar<'_>,
    req: &Request<'_>,
    auth: AuthUser,
    body: Json<ChangePasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    match crypto::verify_password(&salt.0, &body.current_password, &auth.0.password_hash) {
        crypto::VerifyOutcome::Rejected => return Err(AppError::Validation("current password is incorrect".into())),
        crypto::VerifyOutcome::Accepted { .. } => {}
    }
    if !crypto::validate_password(&body.new_password) {
        return Err(AppError::Validation("new password too short".into()));
    }

    let conn = db.conn.lock().unwrap();
    let hash = crypto::hash_password(&salt.0, &body.new_password);
    store::users::update_password_hash(&conn, &auth.0.id, &hash)?;

    // Rotating the token here is the single-active-session enforcement
    // point: every other session cookie for this user stops matching and
    // is rejected on its next request.
    let token = auth::random_token();
    store::users::rotate_session_token(&conn, &auth.0.id, &token)?;
    store::audit::log_access(&conn, Some(&auth.0.id), "password_change", &ip.0, "", &super::now())?;
    auth::start_session(cookies, &auth.0.id, &token, config.use_https);
    Ok(Json(serde_json::json!({"ok": true})))
}

#[rocket::delete("/api/me", format = "json", data = "<body>")]
pub fn delete_account(
    db: &State<Db>,
    salt: &State<InstallSalt>,
    ip: ClientIp,
    cookies: &CookieJar<'_>,
    req: &Request<'_>,
    auth: AuthUser,
    body: Json<DeleteAccountRequest>,
) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    match crypto::verify_password(&salt.0, &body.password, &auth.0.password_hash) {
        crypto::VerifyOutcome::Rejected => return Err(AppError::Validation("password is incorrect".into())),
        crypto::VerifyOutcome::Accepted { .. } => {}
    }
    let conn = db.conn.lock().unwrap();
    store::audit::log_access(&conn, Some(&auth.0.id), "account_delete", &ip.0, "", &super::now())?;
    store::users::delete(&conn, &auth.0.id)?;
    auth::clear_session(cookies);
    Ok(Json(serde_json::json!({"ok": true})))
}
