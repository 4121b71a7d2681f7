//! Read-only user listings. Membership is not required here: usernames
//! and presence are visible server-wide (there's no room-scoped privacy
//! boundary on "who exists"), only message content is room-scoped.

use crate::auth::AuthUser;
use crate::db::Db;
use crate::error::AppResult;
use crate::models::PublicUser;
use crate::store;
use rocket::serde::json::Json;
use rocket::{get, State};

#[get("/api/users")]
pub fn list_users(db: &State<Db>, _auth: AuthUser) -> AppResult<Json<Vec<PublicUser>>> {
    let conn = db.conn.lock().unwrap();
    Ok(Json(store::users::list_all(&conn)?))
}

#[get("/api/users/online")]
pub fn list_online_users(db: &State<Db>, _auth: AuthUser) -> AppResult<Json<Vec<PublicUser>>> {
    let conn = db.conn.lock().unwrap();
    Ok(Json(store::users::list_online(&conn)?))
}
