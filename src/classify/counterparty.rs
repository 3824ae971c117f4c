//! Counterparty Name Resolution
//!
//! A contact record wins when the transfer context has one; otherwise the
//! name is pulled out of the bank's free-text description:
//!
//! 1. strip a leading 4-digit sequence number (and the spaces after it);
//! 2. take the text up to the next run of two or more spaces;
//! 3. trim.
//!
//! Bank descriptions pad the trailing reference block with space runs, e.g.
//! `"0480 Transfer From: Wise User      TRN 7731"`, so the ≥2-space run is
//! the field boundary.

/// Extract a display name from a bank free-text description.
/// Returns `None` when nothing usable remains.
pub fn extract_counterparty(description: &str) -> Option<String> {
    let trimmed = description.trim_start();

    // Leading 4-digit sequence number, if present. Exactly four digits:
    // a longer digit run is part of the name ("04801 Main Street").
    let rest = match trimmed.as_bytes() {
        [a, b, c, d, tail @ ..]
            if [a, b, c, d].iter().all(|ch| ch.is_ascii_digit())
                && tail.first().map_or(true, |ch| !ch.is_ascii_digit()) =>
        {
            trimmed[4..].trim_start()
        }
        _ => trimmed,
    };

    // Field boundary: first run of >=2 spaces
    let end = find_space_run(rest).unwrap_or(rest.len());
    let name = rest[..end].trim();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Byte index of the first occurrence of two consecutive spaces
fn find_space_run(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    bytes.windows(2).position(|w| w == b"  ")
}
