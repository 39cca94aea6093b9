//! Request signing and reply parsing for the vendor's open API.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

pub const METHOD_TOKEN_GET: &str = "jimi.oauth.token.get";
pub const METHOD_TOKEN_REFRESH: &str = "jimi.oauth.token.refresh";
pub const METHOD_INSTRUCTION_SEND: &str = "jimi.open.instruction.send";

pub const UNLOCK_INSTRUCTION_ID: &str = "416";
pub const UNLOCK_INSTRUCTION_TEMPLATE: &str = "OPEN#";
pub const STATUS_INSTRUCTION_ID: &str = "418";
pub const STATUS_INSTRUCTION_TEMPLATE: &str = "STATUS#";

const API_VERSION: &str = "0.9";

pub fn md5_hex_lower(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parameters shared by every API method. The signature is appended last,
/// over the sorted key/value concatenation wrapped in the app secret.
pub fn common_params(method: &str, app_key: &str, now: DateTime<Utc>) -> Vec<(String, String)> {
    vec![
        ("method".to_string(), method.to_string()),
        (
            "timestamp".to_string(),
            now.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
        ("app_key".to_string(), app_key.to_string()),
        ("sign_method".to_string(), "md5".to_string()),
        ("v".to_string(), API_VERSION.to_string()),
        ("format".to_string(), "json".to_string()),
    ]
}

pub fn sign(params: &[(String, String)], secret: &str) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut payload = String::from(secret);
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload.push_str(secret);

    let mut hasher = Md5::new();
    hasher.update(payload.as_bytes());
    hex::encode_upper(hasher.finalize())
}

pub fn signed_form(mut params: Vec<(String, String)>, secret: &str) -> Vec<(String, String)> {
    let signature = sign(&params, secret);
    params.push(("sign".to_string(), signature));
    params
}

/// Reply envelope for the oauth methods.
#[derive(Debug, Deserialize)]
pub struct TokenReply {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<TokenGrant>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenGrant {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "expiresIn", default)]
    pub expires_in: Option<i64>,
}

/// Reply envelope for instruction sends. `result` is the raw text the lock
/// answered with.
#[derive(Debug, Deserialize)]
pub struct InstructionReply {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

/// How the lock answered an OPEN instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockReply {
    Confirmed,
    /// The lock reports it was already open. Counted as unconfirmed so the
    /// caller never starts a ride off a stale bolt position.
    AlreadyUnlocked,
    NotConfirmed,
}

pub fn parse_unlock_reply(reply: &InstructionReply) -> UnlockReply {
    if reply.code != 0 {
        return UnlockReply::NotConfirmed;
    }

    let result = reply.result.as_deref().unwrap_or("");
    if result.contains("OPEN set OK") {
        UnlockReply::Confirmed
    } else if result.contains("OPEN command is not executed") {
        UnlockReply::AlreadyUnlocked
    } else {
        UnlockReply::NotConfirmed
    }
}

/// Physical bolt position as reported by a STATUS instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
    Unknown,
}

fn locked_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\block state;").expect("hardcoded pattern"))
}

fn unlocked_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bunlock state;").expect("hardcoded pattern"))
}

/// The status text names exactly one of the two bolt positions. Anything
/// else (error code, both markers, neither marker) is `Unknown`; callers
/// must treat `Unknown` as "do nothing".
pub fn parse_lock_state(reply: &InstructionReply) -> LockState {
    if reply.code != 0 {
        return LockState::Unknown;
    }

    let result = reply.result.as_deref().unwrap_or("").to_lowercase();
    let locked = locked_pattern().is_match(&result);
    let unlocked = unlocked_pattern().is_match(&result);

    match (locked, unlocked) {
        (true, false) => LockState::Locked,
        (false, true) => LockState::Unlocked,
        _ => LockState::Unknown,
    }
}
