/*
    validator.rs - Structural validation of operations

    Checks an operation before it is applied or logged. Ensures:
    - The stamp is a real stamp (counter 0 means "nothing seen", and the
      top counter is reserved so observing it never exhausts a local clock)
    - The field name is present and of sane length
    - Numeric values are finite, so register equality stays well defined
    - The tombstone field only carries booleans

    Payload schemas are deliberately not checked; field meaning belongs to
    whoever renders the canvas.
*/

use crate::core_canvas::model::{fields, FieldValue, Operation};
use crate::core_canvas::store::errors::{StoreError, StoreResult};

/// Validation rules
#[derive(Debug, Clone)]
pub struct ValidationRules {
    /// Longest accepted field name, in bytes
    pub max_field_len: usize,

    /// Longest accepted text value, in bytes
    pub max_text_len: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        ValidationRules { max_field_len: 256, max_text_len: 1 << 20 }
    }
}

/// Validates operations against `ValidationRules`
#[derive(Debug, Clone, Default)]
pub struct OperationValidator {
    rules: ValidationRules,
}

impl OperationValidator {
    pub fn new(rules: ValidationRules) -> Self {
        OperationValidator { rules }
    }

    pub fn validate(&self, op: &Operation) -> StoreResult<()> {
        if op.stamp.counter == 0 {
            return Err(malformed("stamp counter must be at least 1"));
        }
        if op.stamp.counter == u64::MAX {
            return Err(malformed("stamp counter is out of range"));
        }

        if op.field.is_empty() {
            return Err(malformed("empty field name"));
        }
        if op.field.len() > self.rules.max_field_len {
            return Err(malformed(format!(
                "field name is {} bytes, limit {}",
                op.field.len(),
                self.rules.max_field_len
            )));
        }

        match &op.value {
            FieldValue::Number(n) if !n.is_finite() => {
                return Err(malformed(format!("non-finite number in field {}", op.field)));
            }
            FieldValue::Text(s) if s.len() > self.rules.max_text_len => {
                return Err(malformed(format!(
                    "text value is {} bytes, limit {}",
                    s.len(),
                    self.rules.max_text_len
                )));
            }
            _ => {}
        }

        if op.field == fields::TOMBSTONE && op.value.as_bool().is_none() {
            return Err(malformed("tombstone must be a boolean"));
        }

        Ok(())
    }
}

fn malformed(reason: impl Into<String>) -> StoreError {
    StoreError::MalformedOperation(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_canvas::crdt::{LogicalClock, Site};
    use crate::core_canvas::model::EntityId;

    fn op(field: &str, value: FieldValue, counter: u64) -> Operation {
        Operation::new(EntityId::generate(), field, value, LogicalClock::new(counter, Site::generate()))
    }

    #[test]
    fn test_valid_operation_passes() {
        let validator = OperationValidator::default();
        assert!(validator.validate(&op("x", 1.5.into(), 1)).is_ok());
        assert!(validator.validate(&op(fields::TOMBSTONE, true.into(), 3)).is_ok());
    }

    #[test]
    fn test_zero_counter_rejected() {
        let validator = OperationValidator::default();
        let err = validator.validate(&op("x", 1.0.into(), 0)).unwrap_err();
        assert!(matches!(err, StoreError::MalformedOperation(_)));
    }

    #[test]
    fn test_top_counter_rejected() {
        let validator = OperationValidator::default();
        let err = validator.validate(&op("x", 1.0.into(), u64::MAX)).unwrap_err();
        assert!(matches!(err, StoreError::MalformedOperation(_)));
        assert!(validator.validate(&op("x", 1.0.into(), u64::MAX - 1)).is_ok());
    }

    #[test]
    fn test_empty_and_oversized_field_rejected() {
        let validator = OperationValidator::new(ValidationRules { max_field_len: 4, ..Default::default() });
        assert!(validator.validate(&op("", 1.0.into(), 1)).is_err());
        assert!(validator.validate(&op("toolong", 1.0.into(), 1)).is_err());
    }

    #[test]
    fn test_non_finite_number_rejected() {
        let validator = OperationValidator::default();
        assert!(validator.validate(&op("x", f64::NAN.into(), 1)).is_err());
        assert!(validator.validate(&op("y", f64::INFINITY.into(), 1)).is_err());
    }

    #[test]
    fn test_tombstone_must_be_bool() {
        let validator = OperationValidator::default();
        assert!(validator.validate(&op(fields::TOMBSTONE, "yes".into(), 1)).is_err());
    }
}
