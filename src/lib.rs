pub mod auth;
pub mod avscan;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod events;
pub mod identity;
pub mod maintenance;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod state_store;
pub mod store;

use config::AppConfig;
use db::Db;
use events::EventBus;
use identity::{Disabled, IdentityBridge, OidcBridge};
use rate_limit::{RateLimitConfig, RateLimiter};
use rocket_cors::CorsOptions;
use routes::TypingTracker;
use state_store::StateStore;
use std::sync::Arc;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    build_rocket(AppConfig::from_env(), RateLimitConfig::from_env())
}

pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    let mut config = AppConfig::from_env();
    config.database_path = db_path.to_string();
    build_rocket(config, RateLimitConfig::from_env())
}

pub fn rocket_with_db_and_config(db_path: &str, rate_config: RateLimitConfig) -> rocket::Rocket<rocket::Build> {
    let mut config = AppConfig::from_env();
    config.database_path = db_path.to_string();
    build_rocket(config, rate_config)
}

fn build_rocket(config: AppConfig, rate_limit_config: RateLimitConfig) -> rocket::Rocket<rocket::Build> {
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::create_dir_all(&config.uploads_dir).ok();
    std::fs::create_dir_all(format!("{}/profiles", config.uploads_dir)).ok();
    if config.feature_av_scan_enabled {
        std::fs::create_dir_all(format!("{}/quarantine", config.uploads_dir)).ok();
    }

    let db = Db::new(&config.database_path);
    let events = EventBus::new();

    let install_salt = crypto::InstallSalt(crypto::load_or_create_salt(".security_salt"));

    let state_store = match (&config.state_store_redis_url, config.feature_redis_enabled) {
        (Some(url), true) => StateStore::new("im", Some(url)),
        _ => StateStore::new_in_memory("im"),
    };

    let identity_bridge: Arc<dyn IdentityBridge> = if config.oidc_enabled() {
        Arc::new(OidcBridge::new(config.oidc.clone()))
    } else {
        Arc::new(Disabled)
    };

    let rate_limiter = RateLimiter::new();
    let typing_tracker = TypingTracker::default();

    let cors = CorsOptions::default().to_cors().expect("failed to build CORS fairing");

    let figment = rocket::Config::figment().merge(("limits.json", config.max_content_length)).merge(("limits.file", config.max_content_length));

    let maintenance_db = db.clone();
    let maintenance_config = config.clone();
    let avscan_db = db.clone();
    let avscan_state = state_store.clone();
    let avscan_config = config.clone();

    rocket::custom(figment)
        .manage(db)
        .manage(events)
        .manage(state_store)
        .manage(rate_limit_config)
        .manage(rate_limiter)
        .manage(typing_tracker)
        .manage(config)
        .manage(install_salt)
        .manage(identity_bridge)
        .attach(cors)
        .register(
            "/",
            rocket::catchers![routes::too_many_requests, routes::not_found, routes::bad_request, routes::payload_too_large],
        )
        .mount(
            "/",
            rocket::routes![
                routes::register,
                routes::login,
                routes::logout,
                routes::me,
                routes::config_snapshot,
                routes::auth_providers,
                routes::oidc_login,
                routes::oidc_callback,
                routes::change_password,
                routes::delete_account,
                routes::list_users,
                routes::list_online_users,
                routes::create_room,
                routes::list_rooms,
                routes::room_info,
                routes::rename_room,
                routes::room_members_add,
                routes::room_leave,
                routes::kick_member,
                routes::set_admin,
                routes::list_admins,
                routes::admin_check,
                routes::admin_audit_logs,
                routes::pin_room,
                routes::mute_room,
                routes::create_pin,
                routes::list_pins,
                routes::delete_pin,
                routes::create_poll,
                routes::list_polls,
                routes::poll_vote,
                routes::poll_close,
                routes::list_files,
                routes::delete_file,
                routes::send_message,
                routes::get_messages,
                routes::edit_message,
                routes::delete_message,
                routes::add_reaction,
                routes::remove_reaction,
                routes::get_reactions,
                routes::search_basic,
                routes::search_advanced,
                routes::upload_file,
                routes::upload_job_status,
                routes::serve_upload,
                routes::connect_stream,
                routes::mark_read,
                routes::notify_typing,
                routes::update_profile,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Maintenance Loop", |_rocket| {
            Box::pin(async move {
                tokio::spawn(maintenance::spawn_loop(maintenance_db, maintenance_config));
            })
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("AV Scan Worker", move |_rocket| {
            Box::pin(async move {
                if avscan_config.feature_av_scan_enabled {
                    tokio::spawn(avscan::spawn_worker(avscan_db, avscan_state, avscan_config));
                }
            })
        }))
}
