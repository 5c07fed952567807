//! Name validation collaborator
//!
//! Runs before any engine touches the store.

use super::ValidationError;

/// Default maximum name length, in characters
pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;

/// Validates simple node attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameValidator {
    max_length: usize,
}

impl Default for NameValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NAME_LENGTH)
    }
}

impl NameValidator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Reject empty (or whitespace-only) names and names over the length limit
    pub fn validate_name(&self, name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::Empty);
        }

        let actual = name.chars().count();
        if actual > self.max_length {
            return Err(ValidationError::TooLong {
                max: self.max_length,
                actual,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_regular_name() {
        assert!(NameValidator::default().validate_name("Research").is_ok());
    }

    #[test]
    fn test_rejects_empty_and_blank() {
        let validator = NameValidator::default();
        assert_eq!(validator.validate_name(""), Err(ValidationError::Empty));
        assert_eq!(validator.validate_name("   "), Err(ValidationError::Empty));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let validator = NameValidator::new(3);
        assert!(validator.validate_name("äöü").is_ok());
        assert_eq!(
            validator.validate_name("abcd"),
            Err(ValidationError::TooLong { max: 3, actual: 4 })
        );
    }
}
