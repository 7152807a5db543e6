//! Operand promotion for `add`, `sub`, `mul` and `div`.
//!
//! Numeric promotion, checked in order:
//! 1. either operand is a double: double
//! 2. both ints: int
//! 3. both bytes: byte
//! 4. any other byte/int/long mix: long
//!
//! Integer results wrap on overflow. `add` additionally concatenates the
//! textual forms when either side is a string.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::Value;

/// Operand pair after promotion to a common kind.
enum Promoted {
    Double(f64, f64),
    Int(i32, i32),
    Byte(i8, i8),
    Long(i64, i64),
}

fn as_long(v: &Value) -> i64 {
    match *v {
        Value::Byte(x) => x as i64,
        Value::Int(x) => x as i64,
        Value::Long(x) => x,
        // promote() rejects the remaining kinds before widening.
        _ => 0,
    }
}

fn promote(instr: &'static str, a: &Value, b: &Value) -> Result<Promoted, VMError> {
    for v in [a, b] {
        if v.as_f64().is_none() {
            return Err(VMError::TypeMismatch {
                instruction: instr,
                expected: "numeric operand",
                actual: v.type_name(),
            });
        }
    }

    Ok(match (a, b) {
        (Value::Double(_), _) | (_, Value::Double(_)) => {
            Promoted::Double(a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default())
        }
        (Value::Int(x), Value::Int(y)) => Promoted::Int(*x, *y),
        (Value::Byte(x), Value::Byte(y)) => Promoted::Byte(*x, *y),
        _ => Promoted::Long(as_long(a), as_long(b)),
    })
}

pub fn add(a: &Value, b: &Value) -> Result<Value, VMError> {
    if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
        return Value::string(format!("{a}{b}"));
    }
    Ok(match promote("add", a, b)? {
        Promoted::Double(x, y) => Value::Double(x + y),
        Promoted::Int(x, y) => Value::Int(x.wrapping_add(y)),
        Promoted::Byte(x, y) => Value::Byte(x.wrapping_add(y)),
        Promoted::Long(x, y) => Value::Long(x.wrapping_add(y)),
    })
}

pub fn sub(a: &Value, b: &Value) -> Result<Value, VMError> {
    Ok(match promote("sub", a, b)? {
        Promoted::Double(x, y) => Value::Double(x - y),
        Promoted::Int(x, y) => Value::Int(x.wrapping_sub(y)),
        Promoted::Byte(x, y) => Value::Byte(x.wrapping_sub(y)),
        Promoted::Long(x, y) => Value::Long(x.wrapping_sub(y)),
    })
}

pub fn mul(a: &Value, b: &Value) -> Result<Value, VMError> {
    Ok(match promote("mul", a, b)? {
        Promoted::Double(x, y) => Value::Double(x * y),
        Promoted::Int(x, y) => Value::Int(x.wrapping_mul(y)),
        Promoted::Byte(x, y) => Value::Byte(x.wrapping_mul(y)),
        Promoted::Long(x, y) => Value::Long(x.wrapping_mul(y)),
    })
}

/// Divides `a` by `b`.
///
/// Non-numeric operands fail first. After that only an int or double zero
/// divisor is rejected up front with `DivisionByZero`. A zero byte or long
/// divisor passes that check and is caught at the integer division itself as
/// `NativeDivisionFault`.
pub fn div(a: &Value, b: &Value) -> Result<Value, VMError> {
    let promoted = promote("div", a, b)?;
    match b {
        Value::Int(0) => return Err(VMError::DivisionByZero),
        Value::Double(d) if *d == 0.0 => return Err(VMError::DivisionByZero),
        _ => {}
    }

    Ok(match promoted {
        Promoted::Double(x, y) => Value::Double(x / y),
        Promoted::Int(x, y) => Value::Int(x.wrapping_div(y)),
        Promoted::Byte(_, 0) => return Err(VMError::NativeDivisionFault { type_name: "byte" }),
        Promoted::Byte(x, y) => Value::Byte(x.wrapping_div(y)),
        Promoted::Long(_, 0) => return Err(VMError::NativeDivisionFault { type_name: "long" }),
        Promoted::Long(x, y) => Value::Long(x.wrapping_div(y)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_promotion_table() {
        assert_eq!(add(&Value::Int(2), &Value::Long(3)).unwrap(), Value::Long(5));
        assert_eq!(add(&Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(add(&Value::Byte(2), &Value::Byte(3)).unwrap(), Value::Byte(5));
        assert_eq!(add(&Value::Byte(2), &Value::Int(3)).unwrap(), Value::Long(5));
        assert_eq!(
            add(&Value::Long(1), &Value::Double(0.5)).unwrap(),
            Value::Double(1.5)
        );
        assert_eq!(
            add(&Value::Double(0.25), &Value::Byte(1)).unwrap(),
            Value::Double(1.25)
        );
    }

    #[test]
    fn add_concatenates_strings() {
        assert_eq!(
            add(&Value::String("a".into()), &Value::Int(1)).unwrap(),
            Value::String("a1".into())
        );
        assert_eq!(
            add(&Value::Double(2.0), &Value::String("x".into())).unwrap(),
            Value::String("2.0x".into())
        );
        assert_eq!(
            add(&Value::String("ok? ".into()), &Value::Bool(true)).unwrap(),
            Value::String("ok? true".into())
        );
    }

    #[test]
    fn concatenation_respects_string_limit() {
        let long = Value::String("z".repeat(250));
        assert_eq!(
            add(&long, &Value::Long(123456)),
            Err(VMError::StringTooLong { length: 256 })
        );
    }

    #[test]
    fn integer_results_wrap() {
        assert_eq!(
            add(&Value::Byte(127), &Value::Byte(1)).unwrap(),
            Value::Byte(-128)
        );
        assert_eq!(
            mul(&Value::Int(i32::MAX), &Value::Int(2)).unwrap(),
            Value::Int(-2)
        );
        assert_eq!(
            sub(&Value::Long(i64::MIN), &Value::Byte(1)).unwrap(),
            Value::Long(i64::MAX)
        );
        assert_eq!(
            div(&Value::Int(i32::MIN), &Value::Int(-1)).unwrap(),
            Value::Int(i32::MIN)
        );
        assert_eq!(
            div(&Value::Byte(i8::MIN), &Value::Byte(-1)).unwrap(),
            Value::Byte(i8::MIN)
        );
    }

    #[test]
    fn non_numeric_operands_are_rejected() {
        assert_eq!(
            sub(&Value::String("a".into()), &Value::Int(1)),
            Err(VMError::TypeMismatch {
                instruction: "sub",
                expected: "numeric operand",
                actual: "string"
            })
        );
        assert!(matches!(
            mul(&Value::Int(1), &Value::Bool(true)),
            Err(VMError::TypeMismatch { actual: "boolean", .. })
        ));
        assert!(matches!(
            add(&Value::Bool(false), &Value::Int(1)),
            Err(VMError::TypeMismatch { instruction: "add", .. })
        ));
    }

    #[test]
    fn division() {
        assert_eq!(div(&Value::Int(7), &Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(
            div(&Value::Int(7), &Value::Double(2.0)).unwrap(),
            Value::Double(3.5)
        );
        assert_eq!(div(&Value::Long(-9), &Value::Byte(2)).unwrap(), Value::Long(-4));
    }

    #[test]
    fn division_by_int_or_double_zero() {
        assert_eq!(div(&Value::Int(5), &Value::Int(0)), Err(VMError::DivisionByZero));
        assert_eq!(
            div(&Value::Double(1.0), &Value::Double(0.0)),
            Err(VMError::DivisionByZero)
        );
        assert_eq!(
            div(&Value::Double(1.0), &Value::Double(-0.0)),
            Err(VMError::DivisionByZero)
        );
    }

    #[test]
    fn division_checks_operand_kinds_before_zero() {
        assert_eq!(
            div(&Value::String("s".into()), &Value::Int(0)),
            Err(VMError::TypeMismatch {
                instruction: "div",
                expected: "numeric operand",
                actual: "string"
            })
        );
        assert!(matches!(
            div(&Value::Bool(true), &Value::Double(0.0)),
            Err(VMError::TypeMismatch { actual: "boolean", .. })
        ));
    }

    #[test]
    fn division_by_byte_or_long_zero_is_a_native_fault() {
        assert_eq!(
            div(&Value::Byte(5), &Value::Byte(0)),
            Err(VMError::NativeDivisionFault { type_name: "byte" })
        );
        assert_eq!(
            div(&Value::Int(5), &Value::Long(0)),
            Err(VMError::NativeDivisionFault { type_name: "long" })
        );
        assert_eq!(
            div(&Value::Long(5), &Value::Byte(0)),
            Err(VMError::NativeDivisionFault { type_name: "long" })
        );
        // A double dividend turns the zero byte into 0.0 after promotion.
        assert_eq!(
            div(&Value::Double(1.0), &Value::Byte(0)).unwrap(),
            Value::Double(f64::INFINITY)
        );
    }
}
