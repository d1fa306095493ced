//! NIP (Polish tax identifier) helpers.

const WEIGHTS: [u32; 9] = [6, 5, 7, 2, 3, 4, 5, 6, 7];

/// Strip whitespace, dashes and an optional `PL` country prefix.
/// Idempotent: sanitizing an already-sanitized value is a no-op.
///
/// Separators are removed before the prefix check so formatting inside the
/// prefix (`"P-L 52..."`) still sanitizes to the bare id, and the prefix is
/// only stripped when a bare numeric id remains, so a second pass never
/// changes the value again.
pub fn sanitize(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_ascii_uppercase();
    match compact.strip_prefix("PL") {
        Some(rest) if rest.bytes().all(|b| b.is_ascii_digit()) => rest.to_string(),
        _ => compact,
    }
}

/// Validate the 10-digit weighted checksum. The control digit is the weighted
/// sum of the first nine digits mod 11; a remainder of 10 is always invalid.
pub fn is_valid(raw: &str) -> bool {
    let nip = sanitize(raw);
    if nip.len() != 10 || !nip.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = nip.bytes().map(|b| u32::from(b - b'0')).collect();
    let sum: u32 = WEIGHTS.iter().zip(&digits).map(|(w, d)| w * d).sum();
    let control = sum % 11;
    control != 10 && control == digits[9]
}
