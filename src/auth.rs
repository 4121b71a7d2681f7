//! Session identity, single-active-session enforcement, CSRF, and the
//! membership/admin gates every room-scoped route applies.
//!
//! A `FromRequest` guard generalized from a single bearer-token capability
//! to a full session model: two private (signed) cookies carry the user id
//! and the rotating session token; the guard compares the cookie's token
//! against the row in `store::users` on every auth-required route.

use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::store;
use rand::RngCore;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;

pub const SESSION_USER_COOKIE: &str = "uid";
pub const SESSION_TOKEN_COOKIE: &str = "session_token";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "X-CSRF-Token";

pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sets the session + CSRF cookies after a successful login/registration.
/// `secure` should be true iff the deployment terminates TLS.
pub fn start_session(cookies: &CookieJar<'_>, user_id: &str, session_token: &str, secure: bool) -> String {
    let mut uid_cookie = Cookie::new(SESSION_USER_COOKIE, user_id.to_string());
    uid_cookie.set_http_only(true);
    uid_cookie.set_same_site(SameSite::Lax);
    uid_cookie.set_secure(secure);
    cookies.add_private(uid_cookie);

    let mut token_cookie = Cookie::new(SESSION_TOKEN_COOKIE, session_token.to_string());
    token_cookie.set_http_only(true);
    token_cookie.set_same_site(SameSite::Lax);
    token_cookie.set_secure(secure);
    cookies.add_private(token_cookie);

    let csrf = random_token();
    let mut csrf_cookie = Cookie::new(CSRF_COOKIE, csrf.clone());
    csrf_cookie.set_http_only(false);
    csrf_cookie.set_same_site(SameSite::Lax);
    csrf_cookie.set_secure(secure);
    cookies.add(csrf_cookie);
    csrf
}

pub fn clear_session(cookies: &CookieJar<'_>) {
    cookies.remove_private(Cookie::from(SESSION_USER_COOKIE));
    cookies.remove_private(Cookie::from(SESSION_TOKEN_COOKIE));
    cookies.remove(Cookie::from(CSRF_COOKIE));
}

/// Double-submit CSRF check: the header must match the (non-HttpOnly)
/// cookie value issued at login. Callers apply this explicitly on every
/// state-changing handler outside the exempt allowlist (login, register,
/// logout, config, auth-provider discovery, OIDC callbacks, static assets).
pub fn check_csrf(req: &Request<'_>) -> AppResult<()> {
    let cookie_val = req.cookies().get(CSRF_COOKIE).map(|c| c.value().to_string());
    let header_val = req.headers().get_one(CSRF_HEADER).map(|s| s.to_string());
    match (cookie_val, header_val) {
        (Some(c), Some(h)) if !c.is_empty() && c == h => Ok(()),
        _ => Err(AppError::Validation("missing or invalid CSRF token".into())),
    }
}

/// A validated session: the cookie's token matched `users.session_token`.
/// Logging in elsewhere rotates the token, which invalidates every other
/// outstanding session cookie for that user.
pub struct AuthUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let db = match req.guard::<&State<Db>>().await {
            Outcome::Success(d) => d,
            _ => return Outcome::Error((Status::InternalServerError, AppError::External("db unavailable".into()))),
        };
        let cookies = req.cookies();
        let (Some(uid), Some(token)) = (
            cookies.get_private(SESSION_USER_COOKIE).map(|c| c.value().to_string()),
            cookies.get_private(SESSION_TOKEN_COOKIE).map(|c| c.value().to_string()),
        ) else {
            return Outcome::Error((Status::Unauthorized, AppError::AuthN));
        };

        let conn = db.conn.lock().unwrap();
        match store::users::get_by_id(&conn, &uid) {
            Ok(Some(user)) if user.session_token.as_deref() == Some(token.as_str()) => {
                drop(conn);
                Outcome::Success(AuthUser(user))
            }
            _ => {
                drop(conn);
                clear_session(cookies);
                Outcome::Error((Status::Unauthorized, AppError::AuthN))
            }
        }
    }
}

/// Client source address, used for rate limiting and access-log entries.
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// Membership gate: checked *before* existence so a non-member can't
/// distinguish a missing room from one they're simply not in.
pub fn require_member(conn: &rusqlite::Connection, room_id: &str, user_id: &str) -> AppResult<()> {
    if store::rooms::is_member(conn, room_id, user_id)? {
        Ok(())
    } else {
        Err(AppError::AuthZ("not a member of this room".into()))
    }
}

/// Admin gate: rename, admin-set changes, kick, audit export.
pub fn require_admin(conn: &rusqlite::Connection, room_id: &str, user_id: &str) -> AppResult<()> {
    require_member(conn, room_id, user_id)?;
    if store::rooms::is_admin(conn, room_id, user_id)? {
        Ok(())
    } else {
        Err(AppError::AuthZ("admin role required".into()))
    }
}

/// Resolves a room-owned entity (message, poll, ...) and checks
/// membership in one step, folding "doesn't exist" into the same 403 as
/// "not a member" — a non-member must never be able to tell the two
/// apart by comparing a 404 against a 403.
pub fn require_member_owning<T>(
    conn: &rusqlite::Connection,
    user_id: &str,
    fetch: impl FnOnce(&rusqlite::Connection) -> AppResult<Option<T>>,
    room_id_of: impl FnOnce(&T) -> &str,
) -> AppResult<T> {
    match fetch(conn)? {
        Some(entity) if store::rooms::is_member(conn, room_id_of(&entity), user_id)? => Ok(entity),
        _ => Err(AppError::AuthZ("not a member of this room".into())),
    }
}
