//! Password hashing, room-key wrapping, upload-file signature checks, and
//! input sanitization. Grounded in `original_source/app/utils.py` for the
//! legacy hash shape and sanitize/validate rules, upgraded to Argon2id for
//! the current scheme with transparent dual-read verification.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

const LEGACY_PREFIX: &str = "legacy$";

/// Managed-state wrapper around the install pepper so it doesn't collide
/// with other `String` values Rocket might otherwise manage.
pub struct InstallSalt(pub String);

/// Per-install pepper, generated once and persisted to `.security_salt`.
/// Folded into both the legacy and current hash so a stolen DB dump alone
/// isn't enough to brute-force passwords offline.
pub fn load_or_create_salt(path: &str) -> String {
    if let Ok(existing) = fs::read_to_string(path) {
        let trimmed = existing.trim().to_string();
        if !trimmed.is_empty() {
            return trimmed;
        }
    }
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let salt = hex::encode(bytes);
    if let Some(parent) = Path::new(path).parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _ = fs::write(path, &salt);
    salt
}

/// Current scheme: Argon2id, salted per-password on top of the install pepper.
pub fn hash_password(install_salt: &str, password: &str) -> String {
    let salted = format!("{install_salt}{password}{install_salt}");
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(salted.as_bytes(), &salt)
        .expect("argon2 hashing must not fail for a well-formed salt");
    hash.to_string()
}

/// Legacy scheme (`original_source/app/utils.py::hash_password`):
/// `sha256(salt + password + salt)`, hex digest, stored with a marker prefix
/// so `verify_password` can tell which algorithm produced a given row.
pub fn hash_password_legacy(install_salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(install_salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.update(install_salt.as_bytes());
    format!("{LEGACY_PREFIX}{}", hex::encode(hasher.finalize()))
}

pub enum VerifyOutcome {
    Rejected,
    /// Password matched. `bool` is true when the stored hash used the legacy
    /// scheme and the caller should rewrite it to the current one.
    Accepted { needs_upgrade: bool },
}

/// Dual-read: accepts both the legacy and current hash shapes so existing
/// rows keep working across the scheme upgrade.
pub fn verify_password(install_salt: &str, password: &str, stored_hash: &str) -> VerifyOutcome {
    if let Some(digest) = stored_hash.strip_prefix(LEGACY_PREFIX) {
        let expected = hash_password_legacy(install_salt, password);
        let expected_digest = expected.strip_prefix(LEGACY_PREFIX).unwrap_or("");
        return if digest == expected_digest {
            VerifyOutcome::Accepted { needs_upgrade: true }
        } else {
            VerifyOutcome::Rejected
        };
    }

    let salted = format!("{install_salt}{password}{install_salt}");
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => match Argon2::default().verify_password(salted.as_bytes(), &parsed) {
            Ok(()) => VerifyOutcome::Accepted { needs_upgrade: false },
            Err(_) => VerifyOutcome::Rejected,
        },
        Err(_) => VerifyOutcome::Rejected,
    }
}

/// 256-bit random room key, base64 at rest. `wrap`/`unwrap` are identity
/// functions unless a process KEK is configured, keeping the wrap
/// transparent to callers.
pub fn generate_room_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn wrap_room_key(kek: Option<&str>, plaintext_b64: &str) -> String {
    match kek {
        None => plaintext_b64.to_string(),
        Some(k) => {
            let mut mac = Sha256::new();
            mac.update(k.as_bytes());
            mac.update(plaintext_b64.as_bytes());
            format!("wrapped${}${}", hex::encode(mac.finalize()), plaintext_b64)
        }
    }
}

pub fn unwrap_room_key(kek: Option<&str>, wrapped: &str) -> String {
    match (kek, wrapped.strip_prefix("wrapped$")) {
        (Some(_), Some(rest)) => rest.split_once('$').map(|(_, pt)| pt.to_string()).unwrap_or_default(),
        _ => wrapped.to_string(),
    }
}

/// Magic-number ranges for common upload kinds. Plain-text extensions
/// bypass the check entirely since they have no fixed signature.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "log", "json"];

pub fn file_signature_ok(extension: &str, head: &[u8]) -> bool {
    let ext = extension.to_ascii_lowercase();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return true;
    }
    match ext.as_str() {
        "png" => head.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
        "jpg" | "jpeg" => head.starts_with(&[0xFF, 0xD8, 0xFF]),
        "gif" => head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a"),
        "webp" => head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP",
        "pdf" => head.starts_with(b"%PDF"),
        "zip" | "docx" | "xlsx" | "pptx" => head.starts_with(&[0x50, 0x4B, 0x03, 0x04]),
        "gz" | "tgz" => head.starts_with(&[0x1F, 0x8B]),
        _ => true,
    }
}

/// Length-clamp then strip HTML tags, producing plain text
/// (`original_source/app/utils.py::sanitize_input`).
pub fn sanitize_input(input: &str, max_len: usize) -> String {
    let clamped: String = input.chars().take(max_len).collect();
    let mut out = String::with_capacity(clamped.len());
    let mut in_tag = false;
    for c in clamped.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

pub fn validate_username(username: &str) -> bool {
    let len_ok = username.chars().count() >= 3 && username.chars().count() <= 20;
    len_ok && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= 4
}

/// `secure_filename`-style sanitization: strip path separators and any
/// character outside a conservative allowlist.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
