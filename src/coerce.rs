use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;

use crate::{
    config::ReaderConfig,
    data::{FieldValue, ValueKind},
    error::ReadError,
    schema::FieldDescriptor,
    source::{Cell, CellType, CellValue},
};

const DECIMAL_MAX_SCALE: i64 = 28;
const DECIMAL_MAX_DIGITS: i64 = 29;
const DECIMAL_MAX_MANTISSA: u128 = (1 << 96) - 1;
const INTEGER_MAX_DIGITS: i64 = 19;
const BIG_INTEGER_MAX_DIGITS: i64 = 4096;

/// Coerces one mapped cell. `None` or an empty cell yields `Ok(None)` for
/// nullable targets.
pub fn coerce_cell(
    cell: Option<&Cell>,
    descriptor: &FieldDescriptor,
    config: &ReaderConfig,
) -> Result<Option<FieldValue>, ReadError> {
    let target = descriptor.field_type;
    let cell = match cell {
        Some(cell) if !cell.is_empty() => cell,
        _ => return null_value(descriptor),
    };

    if config.undefined_as_null
        && target.kind != ValueKind::Text
        && matches!(cell.cell_type(), CellType::Text | CellType::Formula)
    {
        let raw = cell.text().trim().to_lowercase();
        if raw.is_empty() || config.undefined_tokens.contains(&raw) {
            return null_value(descriptor);
        }
    }

    let value = match target.kind {
        ValueKind::Text => FieldValue::Text(cell.text().into_owned()),
        ValueKind::Boolean => FieldValue::Boolean(boolean_value(cell, descriptor, config)?),
        ValueKind::DateTime => {
            let native = match cell.cell_type() {
                CellType::Date | CellType::Number | CellType::Formula => cell.as_datetime(),
                _ => None,
            };
            let datetime = native.ok_or_else(|| {
                ReadError::coercion(
                    &descriptor.field,
                    target,
                    cell.text(),
                    "cell holds no date value",
                )
            })?;
            FieldValue::DateTime(datetime)
        }
        kind => {
            let number = number_value(cell, descriptor)?;
            narrow(&number, kind).map_err(|reason| {
                ReadError::coercion(&descriptor.field, target, cell.text(), reason)
            })?
        }
    };
    Ok(Some(value))
}

fn null_value(descriptor: &FieldDescriptor) -> Result<Option<FieldValue>, ReadError> {
    if descriptor.field_type.nullable {
        Ok(None)
    } else {
        Err(ReadError::NonNullableNull {
            field: descriptor.field.clone(),
            target: descriptor.field_type.to_string(),
        })
    }
}

fn boolean_value(
    cell: &Cell,
    descriptor: &FieldDescriptor,
    config: &ReaderConfig,
) -> Result<bool, ReadError> {
    match (cell.cell_type(), &cell.value) {
        (CellType::Boolean, CellValue::Bool(value)) => Ok(*value),
        (CellType::Text | CellType::Formula, _) => parse_boolean(&cell.text(), config)
            .ok_or_else(|| {
                ReadError::coercion(
                    &descriptor.field,
                    descriptor.field_type,
                    cell.text(),
                    "not a recognised true or false token",
                )
            }),
        _ => Err(ReadError::coercion(
            &descriptor.field,
            descriptor.field_type,
            cell.text(),
            "cell type cannot hold a boolean",
        )),
    }
}

/// Matches trimmed, lowercased text against the configured token sets.
pub fn parse_boolean(text: &str, config: &ReaderConfig) -> Option<bool> {
    let token = text.trim().to_lowercase();
    if config.true_tokens.contains(&token) {
        Some(true)
    } else if config.false_tokens.contains(&token) {
        Some(false)
    } else {
        None
    }
}

fn number_value(cell: &Cell, descriptor: &FieldDescriptor) -> Result<BigDecimal, ReadError> {
    let parsed = match (cell.cell_type(), &cell.value) {
        (CellType::Number, CellValue::Number(number)) => {
            BigDecimal::from_str(&number.to_string()).ok()
        }
        (CellType::Text | CellType::Formula, _) => parse_number(&cell.text()),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ReadError::coercion(
            &descriptor.field,
            descriptor.field_type,
            cell.text(),
            "not a number",
        )
    })
}

/// Cleans `text` with [`clean_number_string`] and parses the result.
pub fn parse_number(text: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(&clean_number_string(text)).ok()
}

/// Reduces free-form numeric text to something a decimal parser accepts.
///
/// Commas become decimal points and every point but the last is dropped, so
/// both `1,234,567.89` and `1.234.567,89` read as `1234567.89`. `10^N`
/// becomes `EN`, with a `1` coefficient when none precedes it. The result is
/// stable under a second application.
pub fn clean_number_string(input: &str) -> String {
    let compact: String = input
        .to_uppercase()
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect();
    let kept: String = compact
        .replace(',', ".")
        .replace("10^", "E")
        .chars()
        .filter(|ch| ch.is_ascii_digit() || matches!(ch, 'E' | '-' | '.'))
        .collect();

    let mut value: String = match kept.rfind('.') {
        Some(last) => kept
            .char_indices()
            .filter(|(idx, ch)| *ch != '.' || *idx == last)
            .map(|(_, ch)| ch)
            .collect(),
        None => kept,
    };

    if let Some((mantissa, exponent)) = value.split_once('E') {
        value = format!("{mantissa}E{}", exponent.replace('E', ""));
    }

    let (sign, body) = match value.strip_prefix('-') {
        Some(body) => ("-", body),
        None => ("", value.as_str()),
    };
    if body.starts_with('E') {
        value = format!("{sign}1{body}");
    }
    value
}

/// Digits before the decimal point of a nonzero value; zero or negative
/// when its magnitude is below one. `None` for zero.
fn integer_digits(number: &BigDecimal) -> Option<i64> {
    let (mantissa, scale) = number.as_bigint_and_exponent();
    if mantissa.is_zero() {
        return None;
    }
    let digits = i64::try_from(mantissa.magnitude().to_string().len()).ok()?;
    Some(digits.saturating_sub(scale))
}

/// Truncates toward zero. Values wider than `max_digits` are rejected before
/// any rescaling takes place.
fn truncated_integer(number: &BigDecimal, max_digits: i64) -> Option<BigInt> {
    match integer_digits(number) {
        None => Some(BigInt::zero()),
        Some(digits) if digits <= 0 => Some(BigInt::zero()),
        Some(digits) if digits > max_digits => None,
        Some(_) => Some(number.with_scale(0).as_bigint_and_exponent().0),
    }
}

/// Correctly rounded float parse of the exact decimal value.
fn to_float<F: FromStr>(number: &BigDecimal) -> Option<F> {
    let (mantissa, scale) = number.as_bigint_and_exponent();
    format!("{mantissa}e{}", scale.checked_neg()?).parse().ok()
}

fn narrow(number: &BigDecimal, kind: ValueKind) -> Result<FieldValue, String> {
    let out_of_range = || format!("value is out of range for {kind}");
    let value = match kind {
        ValueKind::Int8 | ValueKind::Int16 | ValueKind::Int32 | ValueKind::Int64 => {
            let integer = truncated_integer(number, INTEGER_MAX_DIGITS)
                .and_then(|integer| integer.to_i64())
                .ok_or_else(out_of_range)?;
            let fits = match kind {
                ValueKind::Int8 => i8::try_from(integer).is_ok(),
                ValueKind::Int16 => i16::try_from(integer).is_ok(),
                ValueKind::Int32 => i32::try_from(integer).is_ok(),
                _ => true,
            };
            if !fits {
                return Err(out_of_range());
            }
            FieldValue::Integer(integer)
        }
        ValueKind::Float32 => {
            let float = to_float::<f32>(number)
                .filter(|f| f.is_finite())
                .ok_or_else(out_of_range)?;
            FieldValue::Float(f64::from(float))
        }
        ValueKind::Float64 => {
            let float = to_float::<f64>(number)
                .filter(|f| f.is_finite())
                .ok_or_else(out_of_range)?;
            FieldValue::Float(float)
        }
        ValueKind::BigInteger => FieldValue::BigInteger(
            truncated_integer(number, BIG_INTEGER_MAX_DIGITS).ok_or_else(out_of_range)?,
        ),
        ValueKind::Decimal => FieldValue::Decimal(to_decimal(number).ok_or_else(out_of_range)?),
        ValueKind::BigDecimal => FieldValue::BigDecimal(number.clone()),
        ValueKind::Text | ValueKind::Boolean | ValueKind::DateTime => {
            return Err(format!("{kind} is not a numeric type"));
        }
    };
    Ok(value)
}

fn to_decimal(number: &BigDecimal) -> Option<Decimal> {
    let digits = match integer_digits(number) {
        None => {
            let (_, scale) = number.as_bigint_and_exponent();
            let scale = u32::try_from(scale.clamp(0, DECIMAL_MAX_SCALE)).ok()?;
            return Decimal::try_from_i128_with_scale(0, scale).ok();
        }
        Some(digits) => digits,
    };
    if digits > DECIMAL_MAX_DIGITS {
        return None;
    }
    if digits <= -DECIMAL_MAX_SCALE {
        return Some(Decimal::ZERO);
    }
    let (_, scale) = number.as_bigint_and_exponent();
    let bounded = if scale > DECIMAL_MAX_SCALE {
        number.with_scale(DECIMAL_MAX_SCALE)
    } else if scale < 0 {
        number.with_scale(0)
    } else {
        number.clone()
    };
    let (mantissa, scale) = bounded.as_bigint_and_exponent();
    let mantissa = mantissa.to_i128()?;
    if mantissa.unsigned_abs() > DECIMAL_MAX_MANTISSA {
        return None;
    }
    Decimal::try_from_i128_with_scale(mantissa, u32::try_from(scale).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::FieldType, error::ErrorKind};

    fn descriptor(kind: ValueKind, nullable: bool) -> FieldDescriptor {
        FieldDescriptor {
            field: "value".to_string(),
            name: "Value".to_string(),
            normalized: "value".to_string(),
            column_index: None,
            exact_match: false,
            required: false,
            field_type: FieldType { kind, nullable },
        }
    }

    fn text(value: &str) -> Cell {
        Cell::new(0, CellValue::Text(value.to_string()))
    }

    fn coerce(cell: &Cell, kind: ValueKind) -> Result<Option<FieldValue>, ReadError> {
        coerce_cell(Some(cell), &descriptor(kind, true), &ReaderConfig::default())
    }

    #[test]
    fn cleans_locale_formatted_numbers() {
        assert_eq!(clean_number_string(" 1,234,567.89 "), "1234567.89");
        assert_eq!(clean_number_string("1,2.34,56.7.89"), "1234567.89");
        assert_eq!(clean_number_string("1.234.567,00"), "1234567.00");
        assert_eq!(clean_number_string("U$ 123,00"), "123.00");
        assert_eq!(clean_number_string("R$ 123,00 ++"), "123.00");
        assert_eq!(clean_number_string("3 10^3"), "3E3");
        assert_eq!(clean_number_string("10^3"), "1E3");
        assert_eq!(clean_number_string("-10^2"), "-1E2");
        assert_eq!(clean_number_string("1e5e2"), "1E52");
    }

    #[test]
    fn parses_scientific_and_locale_numbers() {
        assert_eq!(parse_number("10^3"), BigDecimal::from_str("1000").ok());
        assert_eq!(parse_number("1,234,567.89"), BigDecimal::from_str("1234567.89").ok());
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn boolean_tokens_are_locale_inclusive() {
        assert_eq!(
            coerce(&text(" Sim "), ValueKind::Boolean).unwrap(),
            Some(FieldValue::Boolean(true))
        );
        assert_eq!(
            coerce(&text("INATIVO"), ValueKind::Boolean).unwrap(),
            Some(FieldValue::Boolean(false))
        );
        let err = coerce(&text("maybe"), ValueKind::Boolean).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coercion);

        let number = Cell::new(0, CellValue::Number(123.0));
        let err = coerce(&number, ValueKind::Boolean).unwrap_err();
        assert!(err.to_string().contains("'123'"));

        let formula = Cell::formula(0, CellValue::Bool(true));
        assert_eq!(
            coerce(&formula, ValueKind::Boolean).unwrap(),
            Some(FieldValue::Boolean(true))
        );
    }

    #[test]
    fn integers_truncate_and_check_width() {
        let cell = Cell::new(0, CellValue::Number(-12.9));
        assert_eq!(
            coerce(&cell, ValueKind::Int32).unwrap(),
            Some(FieldValue::Integer(-12))
        );
        let err = coerce(&text("300"), ValueKind::Int8).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert_eq!(
            coerce(&text("1.234.567,00"), ValueKind::Int64).unwrap(),
            Some(FieldValue::Integer(1_234_567))
        );
    }

    #[test]
    fn decimal_narrowing_limits_scale_and_mantissa() {
        let cell = text("0.12345678901234567890123456789012");
        match coerce(&cell, ValueKind::Decimal).unwrap() {
            Some(FieldValue::Decimal(d)) => assert_eq!(d.scale(), 28),
            other => panic!("unexpected {other:?}"),
        }
        let huge = text("1E40");
        assert!(coerce(&huge, ValueKind::Decimal).is_err());
        assert_eq!(
            coerce(&text("10^3"), ValueKind::Decimal).unwrap(),
            Some(FieldValue::Decimal(Decimal::from(1000)))
        );
    }

    #[test]
    fn extreme_exponents_narrow_without_rescaling() {
        for kind in [ValueKind::Int32, ValueKind::BigInteger, ValueKind::Decimal] {
            assert!(coerce(&text("10^5000000"), kind).is_err(), "{kind}");
        }
        assert_eq!(
            coerce(&text("10^-5000000"), ValueKind::Int32).unwrap(),
            Some(FieldValue::Integer(0))
        );
        assert_eq!(
            coerce(&text("-10^-5000000"), ValueKind::BigInteger).unwrap(),
            Some(FieldValue::BigInteger(BigInt::zero()))
        );
        assert_eq!(
            coerce(&text("10^-5000000"), ValueKind::Decimal).unwrap(),
            Some(FieldValue::Decimal(Decimal::ZERO))
        );
        assert_eq!(
            coerce(&text("10^-5000000"), ValueKind::Float64).unwrap(),
            Some(FieldValue::Float(0.0))
        );
        assert!(coerce(&text("10^5000000"), ValueKind::Float64).is_err());
        match coerce(&text("0,000"), ValueKind::Decimal).unwrap() {
            Some(FieldValue::Decimal(zero)) => assert_eq!(zero.scale(), 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            coerce(&text("9.99"), ValueKind::Int8).unwrap(),
            Some(FieldValue::Integer(9))
        );
    }

    #[test]
    fn big_decimal_is_exact() {
        let value = coerce(&text("123456789012345678901234567890.000001"), ValueKind::BigDecimal)
            .unwrap();
        assert_eq!(
            value,
            Some(FieldValue::BigDecimal(
                BigDecimal::from_str("123456789012345678901234567890.000001").unwrap()
            ))
        );
    }

    #[test]
    fn empty_cells_respect_nullability() {
        let config = ReaderConfig::default();
        let empty = text("");
        assert_eq!(
            coerce_cell(Some(&empty), &descriptor(ValueKind::Int32, true), &config).unwrap(),
            None
        );
        let err = coerce_cell(None, &descriptor(ValueKind::Int32, false), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonNullableNull);
    }

    #[test]
    fn undefined_tokens_only_apply_when_enabled() {
        let cell = text(" N/A ");
        assert!(coerce(&cell, ValueKind::Float64).is_err());

        let config = ReaderConfig {
            undefined_as_null: true,
            ..ReaderConfig::default()
        };
        let nullable = descriptor(ValueKind::Float64, true);
        assert_eq!(coerce_cell(Some(&cell), &nullable, &config).unwrap(), None);
        let text_target = descriptor(ValueKind::Text, true);
        assert_eq!(
            coerce_cell(Some(&cell), &text_target, &config).unwrap(),
            Some(FieldValue::Text(" N/A ".to_string()))
        );
        let required = descriptor(ValueKind::Float64, false);
        assert!(coerce_cell(Some(&cell), &required, &config).is_err());
    }

    #[test]
    fn dates_come_from_native_or_serial_cells() {
        let serial = Cell::new(0, CellValue::Number(45418.5));
        match coerce(&serial, ValueKind::DateTime).unwrap() {
            Some(FieldValue::DateTime(dt)) => {
                assert_eq!(dt.to_string(), "2024-05-06 12:00:00")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(coerce(&text("2024-05-06"), ValueKind::DateTime).is_err());
    }

    #[test]
    fn numeric_cells_use_shortest_representation() {
        let cell = Cell::new(0, CellValue::Number(0.1));
        assert_eq!(
            coerce(&cell, ValueKind::BigDecimal).unwrap(),
            Some(FieldValue::BigDecimal(BigDecimal::from_str("0.1").unwrap()))
        );
        let cell = Cell::new(0, CellValue::Bool(true));
        assert!(coerce(&cell, ValueKind::Int32).is_err());
    }
}
