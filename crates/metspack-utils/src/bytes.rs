use crate::error::{BytesError, BytesResult};

const BINARY_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Formats a byte count with binary units and the given number of decimals.
///
/// ```
/// use metspack_utils::bytes::format_bytes;
///
/// assert_eq!(format_bytes(1536, 2), "1.50 KiB");
/// assert_eq!(format_bytes(12, 0), "12 B");
/// ```
pub fn format_bytes(bytes: u64, precision: usize) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BINARY_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.precision$} {}", BINARY_UNITS[unit])
}

/// Parses sizes such as `"512MiB"`, `"2 GB"` or a bare `"4096"`.
///
/// `iB` suffixes are powers of 1024, plain `B` suffixes powers of 1000.
///
/// # Errors
///
/// * [`BytesError::ParseFailed`] for an unknown suffix or a malformed number.
pub fn parse_bytes(input: &str) -> BytesResult<u64> {
    let trimmed = input.trim();
    if let Ok(plain) = trimmed.parse::<u64>() {
        return Ok(plain);
    }

    let fail = |reason: &str| {
        BytesError::ParseFailed {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    };

    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| fail("missing unit"))?;
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number
        .trim()
        .parse()
        .map_err(|_| fail("invalid number"))?;

    let unit = unit.trim().to_ascii_uppercase();
    let (prefix, base) = if let Some(prefix) = unit.strip_suffix("IB") {
        (prefix, 1024f64)
    } else if let Some(prefix) = unit.strip_suffix('B') {
        (prefix, 1000f64)
    } else {
        return Err(fail("unit must end with `B` or `iB`"));
    };

    let exponent = match prefix {
        "" => 0,
        "K" => 1,
        "M" => 2,
        "G" => 3,
        "T" => 4,
        "P" => 5,
        "E" => 6,
        _ => return Err(fail("unknown unit prefix")),
    };

    Ok((number * base.powi(exponent)).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0, 0), "0 B");
        assert_eq!(format_bytes(1023, 1), "1023.0 B");
        assert_eq!(format_bytes(1024, 0), "1 KiB");
        assert_eq!(format_bytes(3 * 1024_u64.pow(2) / 2, 2), "1.50 MiB");
        assert_eq!(format_bytes(1024_u64.pow(3), 2), "1.00 GiB");
        assert_eq!(format_bytes(u64::MAX, 0), "16 EiB");
    }

    #[test]
    fn test_parse_bytes() {
        assert_eq!(parse_bytes("4096").unwrap(), 4096);
        assert_eq!(parse_bytes(" 12B ").unwrap(), 12);
        assert_eq!(parse_bytes("1KiB").unwrap(), 1024);
        assert_eq!(parse_bytes("1.5 KB").unwrap(), 1500);
        assert_eq!(parse_bytes("512MiB").unwrap(), 512 * 1024_u64.pow(2));
        assert_eq!(parse_bytes("2gb").unwrap(), 2 * 1000_u64.pow(3));
    }

    #[test]
    fn test_parse_bytes_rejects_garbage() {
        assert!(parse_bytes("MiB").is_err());
        assert!(parse_bytes("1.2.3MB").is_err());
        assert!(parse_bytes("10 ZB").is_err());
        assert!(parse_bytes("10 Mx").is_err());
        assert!(parse_bytes("").is_err());
    }
}
