//! Argument-shape validation rules.
//!
//! Rules are pure checks over the argument vector that remains after
//! routing. They run in declaration order and the first failure
//! short-circuits; failures are never aggregated.
//!
//! # Examples
//!
//! ```
//! use toolbelt_core::{ValidationError, ValidationRule, validate_args};
//!
//! let rules = [ValidationRule::AllNumeric, ValidationRule::MinCount(1)];
//! let args: Vec<String> = ["2", "3", "5"].iter().map(|s| s.to_string()).collect();
//! assert!(validate_args(&rules, &args).is_ok());
//!
//! let bad: Vec<String> = ["2", "x"].iter().map(|s| s.to_string()).collect();
//! assert_eq!(
//!     validate_args(&rules, &bad),
//!     Err(ValidationError::NotNumeric("x".into()))
//! );
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One argument-shape check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// At least `n` arguments.
    MinCount(usize),
    /// At most `n` arguments.
    MaxCount(usize),
    /// Exactly `n` arguments.
    ExactCount(usize),
    /// Every argument parses as a 32-bit integer.
    AllNumeric,
}

/// Rule failure. The `Display` text is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("At least {min} argument(s) required, but only {actual} provided.")]
    TooFew { min: usize, actual: usize },
    #[error("Maximum {max} argument(s) allowed, but {actual} provided.")]
    TooMany { max: usize, actual: usize },
    #[error("Exactly {expected} argument(s) required, but {actual} provided.")]
    WrongCount { expected: usize, actual: usize },
    #[error("Argument '{0}' is not a valid number.")]
    NotNumeric(String),
}

impl ValidationRule {
    pub fn validate(&self, args: &[String]) -> Result<(), ValidationError> {
        let actual = args.len();
        match *self {
            Self::MinCount(min) if actual < min => Err(ValidationError::TooFew { min, actual }),
            Self::MaxCount(max) if actual > max => Err(ValidationError::TooMany { max, actual }),
            Self::ExactCount(expected) if actual != expected => {
                Err(ValidationError::WrongCount { expected, actual })
            }
            Self::AllNumeric => match args.iter().find(|arg| arg.parse::<i32>().is_err()) {
                Some(arg) => Err(ValidationError::NotNumeric(arg.clone())),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// Evaluates `rules` in order and returns the first failure.
pub fn validate_args(rules: &[ValidationRule], args: &[String]) -> Result<(), ValidationError> {
    rules.iter().try_for_each(|rule| rule.validate(args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_count_rules_follow_length_laws() {
        for len in 0..6 {
            let a: Vec<String> = (0..len).map(|i| i.to_string()).collect();
            for n in 0..6 {
                assert_eq!(ValidationRule::MinCount(n).validate(&a).is_err(), len < n);
                assert_eq!(ValidationRule::MaxCount(n).validate(&a).is_err(), len > n);
                assert_eq!(ValidationRule::ExactCount(n).validate(&a).is_err(), len != n);
            }
        }
    }

    #[test]
    fn test_all_numeric_names_first_offender() {
        let err = ValidationRule::AllNumeric
            .validate(&args(&["1", "a", "b"]))
            .unwrap_err();
        assert_eq!(err, ValidationError::NotNumeric("a".into()));
        assert_eq!(err.to_string(), "Argument 'a' is not a valid number.");
    }

    #[test]
    fn test_all_numeric_accepts_signed_and_empty() {
        assert!(ValidationRule::AllNumeric.validate(&args(&["-4", "+7", "0"])).is_ok());
        assert!(ValidationRule::AllNumeric.validate(&[]).is_ok());
        assert!(ValidationRule::AllNumeric.validate(&args(&["1.5"])).is_err());
        assert!(ValidationRule::AllNumeric.validate(&args(&["99999999999"])).is_err());
    }

    #[test]
    fn test_first_failure_short_circuits() {
        let rules = [ValidationRule::MinCount(3), ValidationRule::AllNumeric];
        let err = validate_args(&rules, &args(&["x"])).unwrap_err();
        assert_eq!(err, ValidationError::TooFew { min: 3, actual: 1 });
    }

    #[test]
    fn test_messages_match_user_text() {
        assert_eq!(
            ValidationRule::MaxCount(1).validate(&args(&["a", "b"])).unwrap_err().to_string(),
            "Maximum 1 argument(s) allowed, but 2 provided."
        );
        assert_eq!(
            ValidationRule::ExactCount(2).validate(&args(&["a"])).unwrap_err().to_string(),
            "Exactly 2 argument(s) required, but 1 provided."
        );
        assert_eq!(
            ValidationRule::MinCount(1).validate(&[]).unwrap_err().to_string(),
            "At least 1 argument(s) required, but only 0 provided."
        );
    }

    #[test]
    fn test_rule_serializes_snake_case() {
        let json = serde_json::to_string(&ValidationRule::MinCount(2)).unwrap();
        assert_eq!(json, r#"{"min_count":2}"#);
        let json = serde_json::to_string(&ValidationRule::AllNumeric).unwrap();
        assert_eq!(json, r#""all_numeric""#);
    }
}
