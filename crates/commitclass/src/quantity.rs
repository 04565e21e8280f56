//! Resource quantities
//!
//! A [`Quantity`] is an integer count kept at its own scale: whole base
//! units (cores, bytes) when the written amount is whole, milli-units
//! otherwise or when written with an `m` suffix. Commit scaling works on
//! that integer, so `1000m` scaled by one half becomes `500m`.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity as ApiQuantity;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest mantissa accepted before arithmetic could overflow
const MAX_MANTISSA_DIGITS: usize = 24;

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ei", 6),
    ("Pi", 5),
    ("Ti", 4),
    ("Gi", 3),
    ("Mi", 2),
    ("Ki", 1),
];

const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("E", 18),
    ("P", 15),
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,
    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),
    #[error("unknown suffix {suffix:?} in quantity {input:?}")]
    UnknownSuffix { input: String, suffix: String },
    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Which suffix family a quantity prints with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Powers of 1000: k, M, G, ...
    DecimalSi,
    /// Powers of 1024: Ki, Mi, Gi, ...
    BinarySi,
}

#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    value: i64,
    milli: bool,
    format: Format,
}

impl Quantity {
    /// Whole base units
    pub fn from_units(value: i64, format: Format) -> Self {
        Self {
            value,
            milli: false,
            format,
        }
    }

    /// Thousandths of a base unit
    pub fn from_milli(value: i64) -> Self {
        Self {
            value,
            milli: true,
            format: Format::DecimalSi,
        }
    }

    /// Integer count at this quantity's scale
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Replace the integer count, keeping scale and format
    pub fn set(&mut self, value: i64) {
        self.value = value;
    }

    pub fn is_milli(&self) -> bool {
        self.milli
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Amount expressed in milli-units regardless of scale
    pub fn milli_value(&self) -> i128 {
        if self.milli {
            self.value as i128
        } else {
            self.value as i128 * 1000
        }
    }
}

/// Quantities are equal when they denote the same amount, so `2` equals
/// `2000m`. Scaling works on the stored integer and can still tell them apart.
impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli_value() == other.milli_value()
    }
}

impl Eq for Quantity {}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match trimmed.as_bytes()[0] {
            b'-' => (true, &trimmed[1..]),
            b'+' => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let number_end = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_end);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));

        let invalid = || QuantityError::InvalidNumber(input.to_string());
        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }
        let digits = format!("{whole}{fraction}");
        if digits.len() > MAX_MANTISSA_DIGITS {
            return Err(out_of_range());
        }
        let mantissa: i128 = digits.parse().map_err(|_| invalid())?;
        let fraction_digits = fraction.len() as i32;

        let (format, binary_power, decimal_exponent) = parse_suffix(suffix).ok_or_else(|| {
            QuantityError::UnknownSuffix {
                input: input.to_string(),
                suffix: suffix.to_string(),
            }
        })?;

        // Scale to milli-units: mantissa * 1024^binary_power * 10^(exp + 3 - fraction_digits)
        let mut numerator = mantissa
            .checked_mul(1024i128.checked_pow(binary_power).ok_or_else(out_of_range)?)
            .ok_or_else(out_of_range)?;
        let mut denominator: i128 = 1;
        let power = decimal_exponent + 3 - fraction_digits;
        if power >= 0 {
            let factor = 10i128.checked_pow(power as u32).ok_or_else(out_of_range)?;
            numerator = numerator.checked_mul(factor).ok_or_else(out_of_range)?;
        } else {
            denominator = 10i128
                .checked_pow(power.unsigned_abs())
                .ok_or_else(out_of_range)?;
        }

        // Sub-milli precision rounds away from zero
        let mut milli = numerator / denominator;
        if numerator % denominator != 0 {
            milli += 1;
        }
        if negative {
            milli = -milli;
        }

        let is_milli = suffix == "m" || milli % 1000 != 0;
        let value = if is_milli { milli } else { milli / 1000 };
        let value = i64::try_from(value).map_err(|_| out_of_range())?;

        Ok(Self {
            value,
            milli: is_milli,
            format,
        })
    }
}

/// Returns (format, power of 1024, power of 10)
fn parse_suffix(suffix: &str) -> Option<(Format, u32, i32)> {
    match suffix {
        "" => return Some((Format::DecimalSi, 0, 0)),
        "m" => return Some((Format::DecimalSi, 0, -3)),
        _ => {}
    }

    if let Some((_, power)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some((Format::BinarySi, *power, 0));
    }
    if let Some((_, exponent)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some((Format::DecimalSi, 0, *exponent));
    }

    // Decimal exponent notation: 1e3, 5E-2
    let exponent = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))?;
    exponent
        .parse::<i32>()
        .ok()
        .map(|exponent| (Format::DecimalSi, 0, exponent))
}

fn format_units(f: &mut fmt::Formatter<'_>, value: i128, format: Format) -> fmt::Result {
    if value != 0 {
        match format {
            Format::BinarySi => {
                for (suffix, power) in BINARY_SUFFIXES {
                    let unit = 1024i128.pow(*power);
                    if value % unit == 0 {
                        return write!(f, "{}{}", value / unit, suffix);
                    }
                }
            }
            Format::DecimalSi => {
                for (suffix, exponent) in DECIMAL_SUFFIXES {
                    let unit = 10i128.pow(*exponent as u32);
                    if value % unit == 0 {
                        return write!(f, "{}{}", value / unit, suffix);
                    }
                }
            }
        }
    }
    write!(f, "{value}")
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value as i128;
        if !self.milli {
            return format_units(f, value, self.format);
        }
        if value % 1000 == 0 {
            format_units(f, value / 1000, self.format)
        } else {
            write!(f, "{value}m")
        }
    }
}

impl TryFrom<&ApiQuantity> for Quantity {
    type Error = QuantityError;

    fn try_from(quantity: &ApiQuantity) -> Result<Self, Self::Error> {
        quantity.0.parse()
    }
}

impl From<Quantity> for ApiQuantity {
    fn from(quantity: Quantity) -> Self {
        ApiQuantity(quantity.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_plain_and_suffixed() {
        assert_eq!(q("4").value(), 4);
        assert!(!q("4").is_milli());
        assert_eq!(q("2Gi").value(), 2 * 1024 * 1024 * 1024);
        assert_eq!(q("2Gi").format(), Format::BinarySi);
        assert_eq!(q("3k").value(), 3000);
        assert_eq!(q("1e3").value(), 1000);
        assert_eq!(q("-2").value(), -2);
    }

    #[test]
    fn test_parse_milli_scale() {
        let cpu = q("1000m");
        assert!(cpu.is_milli());
        assert_eq!(cpu.value(), 1000);

        let fractional = q("1.5");
        assert!(fractional.is_milli());
        assert_eq!(fractional.value(), 1500);

        // Below one milli-unit rounds up
        assert_eq!(q("0.0001").value(), 1);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Quantity>(), Err(QuantityError::Empty));
        assert!(matches!(
            "abc".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            "1.2.3".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            "5Zi".parse::<Quantity>(),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            "100000Ei".parse::<Quantity>(),
            Err(QuantityError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_display_canonical() {
        assert_eq!(q("2Gi").to_string(), "2Gi");
        assert_eq!(q("2048Mi").to_string(), "2Gi");
        assert_eq!(q("500m").to_string(), "500m");
        assert_eq!(q("1000m").to_string(), "1");
        assert_eq!(q("1.5").to_string(), "1500m");
        assert_eq!(q("3000").to_string(), "3k");
        assert_eq!(q("0").to_string(), "0");
        assert_eq!(Quantity::from_units(1717986918, Format::BinarySi).to_string(), "1717986918");
    }

    #[test]
    fn test_set_keeps_scale_and_format() {
        let mut cpu = q("1000m");
        cpu.set(500);
        assert_eq!(cpu.to_string(), "500m");

        let mut memory = q("2Gi");
        memory.set(1024 * 1024 * 1024);
        assert_eq!(memory.to_string(), "1Gi");
    }

    #[test]
    fn test_equality_across_scales() {
        assert_eq!(q("1"), q("1000m"));
        assert_eq!(q("1Ki"), q("1024"));
        assert_ne!(q("1k"), q("1Ki"));
    }

    #[test]
    fn test_api_quantity_conversion() {
        let api = ApiQuantity("16Gi".to_string());
        let parsed = Quantity::try_from(&api).unwrap();
        assert_eq!(parsed, q("16Gi"));
        assert_eq!(ApiQuantity::from(parsed).0, "16Gi");
    }
}
