//! Full-text search over message content, backed by the FTS5 index
//! maintained alongside `store::messages`. Advanced search is rate-limited
//! per source IP; basic search is not.

use crate::auth::{self, AuthUser, ClientIp};
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::SearchResponse;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::store;
use rocket::serde::json::Json;
use rocket::serde::Deserialize;
use rocket::{get, post, State};

#[get("/api/search?<q>&<room_id>&<offset>&<limit>")]
pub fn search_basic(
    db: &State<Db>,
    auth: AuthUser,
    q: &str,
    room_id: Option<&str>,
    offset: Option<i64>,
    limit: Option<i64>,
) -> AppResult<Json<SearchResponse>> {
    let conn = db.conn.lock().unwrap();
    if let Some(rid) = room_id {
        auth::require_member(&conn, rid, &auth.0.id)?;
    }
    let offset = offset.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    let query = fts_query(q)?;
    let (results, total, has_more) = store::messages::search(&conn, &auth.0.id, room_id, &query, offset, limit)?;
    Ok(Json(SearchResponse { results, total, offset, limit, has_more }))
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct AdvancedSearchRequest {
    pub q: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[post("/api/search/advanced", format = "json", data = "<body>")]
pub fn search_advanced(
    db: &State<Db>,
    limiter: &State<RateLimiter>,
    rl_config: &State<RateLimitConfig>,
    ip: ClientIp,
    auth: AuthUser,
    body: Json<AdvancedSearchRequest>,
) -> AppResult<Json<SearchResponse>> {
    let rl = limiter.check_with_info(&format!("search:{}", ip.0), rl_config.search_max, rl_config.search_window_secs);
    if !rl.allowed {
        return Err(AppError::RateLimited { retry_after_secs: rl.retry_after_secs, limit: rl.limit });
    }

    let conn = db.conn.lock().unwrap();
    if let Some(rid) = &body.room_id {
        auth::require_member(&conn, rid, &auth.0.id)?;
    }
    let offset = body.offset.max(0);
    let limit = body.limit.clamp(1, 100);
    let query = fts_query(&body.q)?;
    let (results, total, has_more) = store::messages::search(&conn, &auth.0.id, body.room_id.as_deref(), &query, offset, limit)?;
    Ok(Json(SearchResponse { results, total, offset, limit, has_more }))
}

/// FTS5 MATCH syntax treats bare punctuation as a syntax error; quoting
/// the phrase keeps arbitrary user text safe to pass straight through.
fn fts_query(q: &str) -> AppResult<String> {
    let trimmed = q.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("q must not be empty".into()));
    }
    Ok(format!("\"{}\"", trimmed.replace('"', "\"\"")))
}
