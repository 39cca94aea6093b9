//! Free-text input recognizers. Each helper does one thing and owns its
//! pattern, so flow logic never touches a regex directly.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Unlock,
    Register,
    Support,
    Balance,
    Topup,
    Report,
}

pub fn menu_choice(text: &str) -> Option<MenuChoice> {
    match text.trim() {
        "1" => Some(MenuChoice::Unlock),
        "2" => Some(MenuChoice::Register),
        "3" => Some(MenuChoice::Support),
        "4" => Some(MenuChoice::Balance),
        "5" => Some(MenuChoice::Topup),
        "6" => Some(MenuChoice::Report),
        _ => None,
    }
}

fn greeting_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(hola|buenas|buen\s+d[ií]a|buenos\s+d[ií]as|buenas\s+tardes|buenas\s+noches)[\s!¡.,]*$")
            .expect("hardcoded pattern")
    })
}

pub fn is_greeting(text: &str) -> bool {
    greeting_pattern().is_match(text)
}

fn rent_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:hola[\s,!.]+)?quiero\s+alquilar\s+(?:la\s+|el\s+)?(.+?)[\s!.]*$")
            .expect("hardcoded pattern")
    })
}

/// "Hola, quiero alquilar Pegasus" -> Some("Pegasus"). The leading greeting
/// and article are optional; the bike name is whatever remains.
pub fn rent_request(text: &str) -> Option<String> {
    rent_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

pub fn is_menu_command(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "menu" | "menú")
}

pub fn is_affirmative(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "si" | "sí" | "s" | "dale" | "ok" | "confirmo"
    )
}

pub fn is_negative(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "no" | "n")
}

pub fn wants_cancel(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "cancelar" | "cancela")
}

pub fn wants_payment_check(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "listo" | "pague" | "pagué" | "ya pague" | "ya pagué" | "verificar" | "verificar pago"
    )
}

/// DNI: digits and nothing else. Formatting dots must be left out.
pub fn valid_dni(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

pub fn valid_email(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if validator::validate_email(trimmed) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Top-up amount in whole pesos. A leading "$" is tolerated; separators are
/// not, to keep "1.000" from reading as ten.
pub fn topup_amount(text: &str) -> Option<i64> {
    let cleaned = text.trim().trim_start_matches('$').trim();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<i64>().ok().filter(|amount| *amount > 0)
}
