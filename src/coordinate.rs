//! Fixed-point latitude/longitude encoding.
//!
//! Coordinates are stored as `round(value * scale)` integers so two slabs
//! built from the same config compare bit-for-bit. `scale` is carried
//! explicitly (from [`crate::config::EngineConfig`]) rather than as a global,
//! per the no-singletons design note.

use anyhow::{Result, bail};

pub const LAT_MIN: f64 = -90.0;
pub const LAT_MAX: f64 = 90.0;
pub const LON_MIN: f64 = -180.0;
pub const LON_MAX: f64 = 180.0;

/// Upper clamp applied before geohash encoding, working around a library
/// edge case exactly at the north pole.
pub const MAXGHLAT: f64 = 89.999999999999992;

/// Encode a latitude or longitude string/float into the fixed-point
/// representation `round(value * scale)`.
pub fn encode_coordinate(value: &str, scale: u64) -> Result<i64> {
    let digits = decimal_digits(scale);
    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, f),
        None => (value, ""),
    };

    let sign: i64 = if int_part.starts_with('-') { -1 } else { 1 };
    let int_digits = int_part.trim_start_matches('-');
    let int_value: i64 = if int_digits.is_empty() {
        0
    } else {
        int_digits
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid coordinate integer part: {int_part}"))?
    };

    let mut frac_clipped = frac_part.to_string();
    if frac_clipped.len() > digits {
        frac_clipped.truncate(digits);
    } else {
        while frac_clipped.len() < digits {
            frac_clipped.push('0');
        }
    }
    let frac_value: i64 = if frac_clipped.is_empty() {
        0
    } else {
        frac_clipped
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid coordinate fractional part: {frac_part}"))?
    };

    Ok(sign * (int_value * scale as i64 + frac_value))
}

/// Encode a coordinate given as a float, matching [`encode_coordinate`]'s
/// rounding semantics.
pub fn encode_coordinate_f64(value: f64, scale: u64) -> i64 {
    (value * scale as f64).round() as i64
}

/// Decode a fixed-point integer back into `"<int>.<frac>"`, `frac`
/// zero-padded to the scale's digit width.
pub fn decode_coordinate(encoded: i64, scale: u64) -> String {
    let digits = decimal_digits(scale);
    let sign = if encoded < 0 { "-" } else { "" };
    let magnitude = encoded.unsigned_abs();
    let scale = scale as i64;
    let int_part = magnitude as i64 / scale;
    let frac_part = magnitude as i64 % scale;
    format!("{sign}{int_part}.{frac_part:0digits$}")
}

/// Decode a fixed-point integer into an `f64`, for geohash and bbox math.
pub fn decode_coordinate_f64(encoded: i64, scale: u64) -> f64 {
    encoded as f64 / scale as f64
}

pub fn validate_lat(lat: f64) -> Result<()> {
    if !(LAT_MIN..=LAT_MAX).contains(&lat) {
        bail!("latitude {lat} out of range [{LAT_MIN}, {LAT_MAX}]");
    }
    Ok(())
}

pub fn validate_lon(lon: f64) -> Result<()> {
    if !(LON_MIN..=LON_MAX).contains(&lon) {
        bail!("longitude {lon} out of range [{LON_MIN}, {LON_MAX}]");
    }
    Ok(())
}

/// Clamp a latitude to work around the geohash library's pole edge case.
pub fn clamp_for_geohash(lat: f64) -> f64 {
    lat.min(MAXGHLAT)
}

fn decimal_digits(scale: u64) -> usize {
    (scale as f64).log10().floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_typical_coordinate() {
        let scale = 10_000_000;
        let encoded = encode_coordinate("12.3456789", scale).unwrap();
        assert_eq!(encoded, 123_456_789);
        assert_eq!(decode_coordinate(encoded, scale), "12.3456789");
    }

    #[test]
    fn negative_coordinate_round_trips() {
        let scale = 10_000_000;
        let encoded = encode_coordinate("-1.0000000", scale).unwrap();
        assert_eq!(encoded, -10_000_000);
        assert_eq!(decode_coordinate(encoded, scale), "-1.0000000");
    }

    #[test]
    fn fractional_part_is_padded_and_clipped() {
        let scale = 1000;
        assert_eq!(encode_coordinate("1.2", scale).unwrap(), 1200);
        assert_eq!(encode_coordinate("1.23456", scale).unwrap(), 1234);
    }

    #[test]
    fn clamp_applies_only_above_threshold() {
        assert_eq!(clamp_for_geohash(45.0), 45.0);
        assert_eq!(clamp_for_geohash(90.0), MAXGHLAT);
    }
}
