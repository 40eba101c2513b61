//! Scalar encoding: reading and writing value bytes.
//!
//! All scalars are stored little-endian. `Dec` is an `i128` in fixed point
//! with 18 decimal places.

use crate::EvalError;
use rill_types::{FracPrecision, IntPrecision};

/// Fixed-point scale of `Dec`: 10^18.
pub const DEC_SCALE: i128 = 1_000_000_000_000_000_000;

/// Read an integer of the given precision, sign-extended into an `i128`
/// accumulator.
pub fn read_int(bytes: &[u8], precision: IntPrecision) -> i128 {
    let size = precision.size() as usize;
    let mut buf = [0u8; 16];
    buf[..size].copy_from_slice(&bytes[..size]);
    if precision.is_signed() {
        // Sign-extend from the value's top bit.
        if size < 16 && bytes[size - 1] & 0x80 != 0 {
            for byte in &mut buf[size..] {
                *byte = 0xFF;
            }
        }
        i128::from_le_bytes(buf)
    } else {
        let value = u128::from_le_bytes(buf);
        i128::try_from(value).unwrap_or(i128::MAX)
    }
}

/// Write an integer at the given precision (truncating the accumulator).
pub fn write_int(bytes: &mut [u8], precision: IntPrecision, value: i128) {
    let size = precision.size() as usize;
    let le = value.to_le_bytes();
    bytes[..size].copy_from_slice(&le[..size]);
}

/// Read a fraction. `Dec` is returned as its raw fixed-point `i128`.
pub fn read_frac(bytes: &[u8], precision: FracPrecision) -> FracValue {
    match precision {
        FracPrecision::F32 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[..4]);
            FracValue::F32(f32::from_le_bytes(buf))
        }
        FracPrecision::F64 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            FracValue::F64(f64::from_le_bytes(buf))
        }
        FracPrecision::Dec => {
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&bytes[..16]);
            FracValue::Dec(i128::from_le_bytes(buf))
        }
    }
}

/// Write a fraction at the given precision.
pub fn write_frac(bytes: &mut [u8], precision: FracPrecision, value: FracValue) {
    match (precision, value) {
        (FracPrecision::F32, v) => bytes[..4].copy_from_slice(&(v.to_f64() as f32).to_le_bytes()),
        (FracPrecision::F64, v) => bytes[..8].copy_from_slice(&v.to_f64().to_le_bytes()),
        (FracPrecision::Dec, v) => bytes[..16].copy_from_slice(&v.to_dec().to_le_bytes()),
    }
}

/// A fraction read back at its native precision.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FracValue {
    F32(f32),
    F64(f64),
    Dec(i128),
}

impl FracValue {
    pub fn to_f64(self) -> f64 {
        match self {
            FracValue::F32(v) => f64::from(v),
            FracValue::F64(v) => v,
            FracValue::Dec(raw) => raw as f64 / DEC_SCALE as f64,
        }
    }

    pub fn to_dec(self) -> i128 {
        match self {
            FracValue::F32(v) => (f64::from(v) * DEC_SCALE as f64) as i128,
            FracValue::F64(v) => (v * DEC_SCALE as f64) as i128,
            FracValue::Dec(raw) => raw,
        }
    }

    /// Convert an `f64` into the fixed-point `Dec` representation.
    pub fn dec_from_f64(value: f64) -> i128 {
        (value * DEC_SCALE as f64) as i128
    }
}

/// `Dec` multiplication: `(a * b) / 10^18` in 128-bit fixed point.
pub fn dec_mul(a: i128, b: i128) -> Result<i128, EvalError> {
    // Split to keep the intermediate product inside 128 bits for the
    // common range: (ah*SCALE + al) * b = ah*b*1 + al*b/SCALE.
    let (a_hi, a_lo) = (a / DEC_SCALE, a % DEC_SCALE);
    let hi = a_hi.checked_mul(b).ok_or(EvalError::Crash(
        "Dec multiplication overflowed".to_owned(),
    ))?;
    let lo = a_lo
        .checked_mul(b)
        .map(|v| v / DEC_SCALE)
        .ok_or(EvalError::Crash("Dec multiplication overflowed".to_owned()))?;
    hi.checked_add(lo)
        .ok_or(EvalError::Crash("Dec multiplication overflowed".to_owned()))
}

/// `Dec` division: `(a * 10^18) / b` in 128-bit fixed point.
pub fn dec_div(a: i128, b: i128) -> Result<i128, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    match a.checked_mul(DEC_SCALE) {
        Some(scaled) => Ok(scaled / b),
        // Fall back to dividing first when the scaled numerator overflows.
        None => Ok((a / b).saturating_mul(DEC_SCALE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip_signed() {
        let mut bytes = [0u8; 16];
        write_int(&mut bytes, IntPrecision::I8, -5);
        assert_eq!(read_int(&bytes, IntPrecision::I8), -5);
        write_int(&mut bytes, IntPrecision::I64, -1_000_000);
        assert_eq!(read_int(&bytes, IntPrecision::I64), -1_000_000);
    }

    #[test]
    fn int_round_trip_unsigned() {
        let mut bytes = [0u8; 16];
        write_int(&mut bytes, IntPrecision::U8, 200);
        assert_eq!(read_int(&bytes, IntPrecision::U8), 200);
    }

    #[test]
    fn dec_fixed_point_multiplication() {
        let a = 5 * DEC_SCALE / 2; // 2.5
        let b = 4 * DEC_SCALE; // 4.0
        assert_eq!(dec_mul(a, b), Ok(10 * DEC_SCALE));
    }

    #[test]
    fn dec_division_by_zero() {
        assert_eq!(dec_div(DEC_SCALE, 0), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn dec_division() {
        let a = 10 * DEC_SCALE;
        let b = 4 * DEC_SCALE;
        assert_eq!(dec_div(a, b), Ok(5 * DEC_SCALE / 2));
    }
}
