//! Primitive conversions shared by the coercion entry points

/// Number to string, following the script-visible formatting rules for
/// the common cases (integers print without a fraction, `-0` prints as `0`).
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        return format!("{:.0}", n);
    }
    format!("{}", n)
}

/// String to number: trimmed decimal or hex literal, empty is 0, else NaN.
pub(crate) fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    // Rust also accepts "inf" and "nan"; scripts do not.
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Canonical array index form of a property name
pub(crate) fn array_index(name: &str) -> Option<u32> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    let index = name.parse::<u32>().ok()?;
    // 2^32 - 1 is a length, not an index.
    (index != u32::MAX).then_some(index)
}

/// Numeric value as an array index, if it is one
pub(crate) fn number_index(n: f64) -> Option<u32> {
    if n.fract() == 0.0 && n >= 0.0 && n < f64::from(u32::MAX) {
        Some(n as u32)
    } else {
        None
    }
}
