//! Number parsing and display in the Indonesian locale used by the review screens
//! (period groups thousands, comma separates decimals).

use regex::Regex;
use std::sync::OnceLock;

const GROUP_SEPARATOR: char = '.';
const DECIMAL_SEPARATOR: char = ',';

fn numeric_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9,.\-]").expect("numeric noise regex"))
}

/// Parse user input such as `"Rp 1.250,50"` into `1250.5`.
/// Empty or non-numeric input yields `None`; this never panics.
pub fn parse_number(input: &str) -> Option<f64> {
    if input.trim().is_empty() {
        return None;
    }
    let stripped = numeric_noise().replace_all(input, "");
    let without_groups: String = stripped.chars().filter(|c| *c != GROUP_SEPARATOR).collect();
    let normalized = without_groups.replacen(DECIMAL_SEPARATOR, ".", 1);
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Group an amount with locale separators, keeping between `min_frac` and `max_frac` decimals.
pub fn group_number(n: f64, min_frac: usize, max_frac: usize) -> String {
    let max_frac = max_frac.max(min_frac);
    let fixed = format!("{:.*}", max_frac, n.abs());
    let (int_part, mut frac_part) = match fixed.find('.') {
        Some(dot) => (fixed[..dot].to_string(), fixed[dot + 1..].to_string()),
        None => (fixed.clone(), String::new()),
    };
    while frac_part.len() > min_frac && frac_part.ends_with('0') {
        frac_part.pop();
    }

    let digits: Vec<char> = int_part.chars().collect();
    let len = digits.len();
    let mut out = String::new();
    let is_zero = digits.iter().all(|c| *c == '0') && frac_part.chars().all(|c| c == '0');
    if n < 0.0 && !is_zero {
        out.push('-');
    }
    for (i, c) in digits.into_iter().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(GROUP_SEPARATOR);
        }
        out.push(c);
    }
    if !frac_part.is_empty() {
        out.push(DECIMAL_SEPARATOR);
        out.push_str(&frac_part);
    }
    out
}

/// ISO 4217 codes with a local symbol and their minor-unit digits.
const CURRENCIES: &[(&str, &str, usize)] = &[
    ("IDR", "Rp", 2),
    ("USD", "US$", 2),
    ("EUR", "€", 2),
    ("GBP", "£", 2),
    ("JPY", "JP¥", 0),
    ("CNY", "CN¥", 2),
    ("SGD", "SGD", 2),
    ("MYR", "MYR", 2),
    ("AUD", "AU$", 2),
    ("KRW", "₩", 0),
];

fn is_well_formed_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Render an amount in the given currency. A malformed code falls back to `"<CODE> <grouped-number>"`.
pub fn format_currency(n: Option<f64>, currency: &str) -> String {
    let n = match n {
        Some(n) if n.is_finite() => n,
        _ => return "-".to_string(),
    };
    let code = currency.trim();
    if !is_well_formed_code(code) {
        return format!("{} {}", code, group_number(n, 0, 3));
    }
    let upper = code.to_uppercase();
    let (symbol, digits) = CURRENCIES
        .iter()
        .find(|(c, _, _)| *c == upper)
        .map(|(_, s, d)| (s.to_string(), *d))
        .unwrap_or_else(|| (upper.clone(), 2));
    let grouped = group_number(n.abs(), digits, digits);
    if n < 0.0 {
        format!("-{} {}", symbol, grouped)
    } else {
        format!("{} {}", symbol, grouped)
    }
}

/// Human-readable size: `0 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let k = 1024f64;
    let b = bytes as f64;
    let i = ((b.ln() / k.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = ((b / k.powi(i as i32)) * 100.0).round() / 100.0;
    format!("{} {}", value, UNITS[i])
}
