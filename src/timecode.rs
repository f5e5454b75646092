//! Time strings used to bound an analysis run.
//!
//! Accepted shapes are bare seconds (`"45"`, `"12.5"`), `"M:S"` and `"H:M:S"`.
//! Only the last component may carry a fraction. Components may be zero but
//! never negative.

use crate::error::{Result, ScoutError};

const MAX_COMPONENTS: usize = 3;

/// Largest offset accepted for a run: one week of footage.
pub const MAX_OFFSET_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

/// Parse a user supplied time string into seconds.
pub fn parse(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ScoutError::InvalidFormat("empty time string".into()));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > MAX_COMPONENTS {
        return Err(ScoutError::InvalidFormat(format!(
            "'{trimmed}' has more than two colons"
        )));
    }

    let last = parts.len() - 1;
    let mut total = 0.0_f64;
    for (idx, part) in parts.iter().enumerate() {
        let value = parse_component(part, idx == last, trimmed)?;
        total = total * 60.0 + value;
    }

    Ok(total)
}

fn parse_component(part: &str, allow_fraction: bool, whole: &str) -> Result<f64> {
    if part.starts_with('-') {
        return Err(ScoutError::InvalidFormat(format!(
            "'{whole}' contains a negative component"
        )));
    }

    let has_digit = part.chars().any(|c| c.is_ascii_digit());
    let well_formed = part
        .chars()
        .all(|c| c.is_ascii_digit() || (allow_fraction && c == '.'));
    if !has_digit || !well_formed {
        return Err(ScoutError::InvalidFormat(format!(
            "'{whole}' has a non-numeric component '{part}'"
        )));
    }

    part.parse::<f64>()
        .map_err(|_| ScoutError::InvalidFormat(format!("'{whole}' has a malformed component '{part}'")))
}

/// Render seconds in the shortest shape `parse` accepts back.
///
/// Negative and non-finite input renders as `"0"`. Values past
/// `MAX_OFFSET_SECONDS` stay bare seconds.
pub fn format(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0".into();
    }
    if seconds < 60.0 || seconds > MAX_OFFSET_SECONDS {
        return format!("{seconds}");
    }

    let whole = seconds.trunc() as u64;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let rem = seconds - (hours * 3600 + minutes * 60) as f64;
    let secs = if rem < 10.0 {
        format!("0{rem}")
    } else {
        format!("{rem}")
    };

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs}")
    } else {
        format!("{minutes}:{secs}")
    }
}

/// Check that the optional bounds describe a usable window.
pub fn validate_range(start: Option<f64>, end: Option<f64>) -> Result<()> {
    for (label, bound) in [("start", start), ("end", end)] {
        if let Some(value) = bound {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoutError::InvalidRange(format!(
                    "{label} offset {value} must be a non-negative number of seconds"
                )));
            }
            if value > MAX_OFFSET_SECONDS {
                return Err(ScoutError::InvalidRange(format!(
                    "{label} offset {value} is past the {MAX_OFFSET_SECONDS} second limit"
                )));
            }
        }
    }

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ScoutError::InvalidRange(format!(
                "start offset {start} is after end offset {end}"
            )));
        }
    }

    Ok(())
}
