//! Small, reusable checks used by [`crate::config::Settings::validate`].
use std::ops::RangeInclusive;

/// Validates if a given string is a valid file path.
///
/// # Arguments
///
/// * `path` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the file path is valid.
/// * `Err(&'static str)` if the file path is invalid.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates a field delimiter for the line protocol.
///
/// Frames end at a newline, so the delimiter may not contain a line break. Any other
/// non-empty delimiter is accepted, including a tab or a space.
pub fn is_valid_delimiter(delimiter: &str) -> Result<(), &'static str> {
    if delimiter.is_empty() {
        return Err("Delimiter cannot be empty");
    }
    if delimiter.contains(['\n', '\r']) {
        return Err("Delimiter cannot contain line breaks");
    }
    Ok(())
}
