//! Input checks shared by the entity constructors.

use crate::error::ValidationError;

pub fn non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

pub fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    // NaN fails this comparison too.
    if !(value > 0.0) {
        return Err(ValidationError::NotPositive { field, value });
    }
    Ok(())
}

pub fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_rejects_blank() {
        assert!(non_empty("name", "Widget").is_ok());
        assert_eq!(
            non_empty("name", "   "),
            Err(ValidationError::Empty { field: "name" })
        );
    }

    #[test]
    fn test_positive() {
        assert!(positive("quantity", 1.0).is_ok());
        assert!(positive("quantity", 0.0).is_err());
        assert!(positive("quantity", -2.0).is_err());
        assert!(positive("quantity", f64::NAN).is_err());
    }

    #[test]
    fn test_in_range_is_inclusive() {
        assert!(in_range("lat", 90.0, -90.0, 90.0).is_ok());
        assert!(in_range("lat", -90.0, -90.0, 90.0).is_ok());
        assert!(in_range("lat", 90.1, -90.0, 90.0).is_err());
        assert!(in_range("lat", f64::NAN, -90.0, 90.0).is_err());
    }
}
