use crate::util::Error;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use std::str::FromStr;

/// Which suffix family a quantity was expressed in, so that a value
/// computed from it can be echoed back in the caller's original unit
/// rather than an arbitrary canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    DecimalSI,
    BinarySI,
}

/// An exact rational value extracted from a `Quantity` string, together
/// with enough information to render it back out in a form a human
/// reading an event would recognise.
#[derive(Debug, Clone)]
pub struct Amount {
    pub value: BigRational,
    pub format: Format,
}

impl Amount {
    pub fn zero() -> Self {
        Amount { value: BigRational::zero(), format: Format::DecimalSI }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.value.is_positive()
    }

    pub fn add(&self, other: &Amount) -> Amount {
        Amount { value: &self.value + &other.value, format: self.format }
    }

    pub fn sub(&self, other: &Amount) -> Amount {
        Amount { value: &self.value - &other.value, format: self.format }
    }

    pub fn gt(&self, other: &Amount) -> bool {
        self.value > other.value
    }
}

fn pow10(n: u32) -> BigInt {
    BigInt::from(10u32).pow(n)
}

fn pow2(n: u32) -> BigInt {
    BigInt::from(2u32).pow(n)
}

/// Parses a Kubernetes-style resource quantity string into an exact
/// rational number of "base units" (bytes for storage/memory, whole
/// cores for CPU, whole items for counts).
///
/// Supports the decimal SI suffixes (`n`, `u`, `m`, none, `k`, `M`, `G`,
/// `T`, `P`, `E`) and the binary SI suffixes (`Ki`, `Mi`, `Gi`, `Ti`,
/// `Pi`, `Ei`). Scientific notation (`1e3`) is not accepted; none of the
/// tracked resource identifiers in this system need it.
pub fn parse(q: &Quantity) -> Result<Amount, Error> {
    let s = q.0.trim();
    if s.is_empty() {
        return Ok(Amount::zero());
    }

    const BINARY: &[(&str, u32)] = &[("Ki", 10), ("Mi", 20), ("Gi", 30), ("Ti", 40), ("Pi", 50), ("Ei", 60)];
    const DECIMAL: &[(&str, i32)] = &[("n", -9), ("u", -6), ("m", -3), ("k", 3), ("M", 6), ("G", 9), ("T", 12), ("P", 15), ("E", 18)];

    for (suffix, exp) in BINARY {
        if let Some(digits) = s.strip_suffix(suffix) {
            let mantissa = parse_decimal(digits)?;
            return Ok(Amount { value: mantissa * BigRational::from_integer(pow2(*exp)), format: Format::BinarySI });
        }
    }
    for (suffix, exp) in DECIMAL {
        if let Some(digits) = s.strip_suffix(suffix) {
            let mantissa = parse_decimal(digits)?;
            let scaled = if *exp >= 0 {
                mantissa * BigRational::from_integer(pow10(*exp as u32))
            } else {
                mantissa / BigRational::from_integer(pow10((-exp) as u32))
            };
            return Ok(Amount { value: scaled, format: Format::DecimalSI });
        }
    }
    Ok(Amount { value: parse_decimal(s)?, format: Format::DecimalSI })
}

fn parse_decimal(s: &str) -> Result<BigRational, Error> {
    if let Some((int_part, frac_part)) = s.split_once('.') {
        let int_part = if int_part.is_empty() { "0" } else { int_part };
        let numerator_str = format!("{int_part}{frac_part}");
        let numerator = BigInt::from_str(&numerator_str)
            .map_err(|e| Error::UserInput(format!("invalid quantity {s:?}: {e}")))?;
        let denominator = pow10(frac_part.len() as u32);
        Ok(BigRational::new(numerator, denominator))
    } else {
        let n = BigInt::from_str(s).map_err(|e| Error::UserInput(format!("invalid quantity {s:?}: {e}")))?;
        Ok(BigRational::from_integer(n))
    }
}

/// Renders an amount back into a `Quantity`, preferring the canonical
/// whole-unit form and falling back to milli-scale for fractional
/// decimal-SI amounts (matching how the platform itself stringifies,
/// e.g. `2.5` cores renders as `2500m`).
pub fn format(amount: &Amount) -> Quantity {
    match amount.format {
        Format::DecimalSI => {
            if amount.value.is_integer() {
                Quantity(amount.value.to_integer().to_string())
            } else {
                let milli = &amount.value * BigRational::from_integer(BigInt::from(1000));
                if milli.is_integer() {
                    Quantity(format!("{}m", milli.to_integer()))
                } else {
                    Quantity(format!("{:.3}", ratio_to_f64(&amount.value)))
                }
            }
        }
        Format::BinarySI => {
            for (suffix, exp) in [("Ei", 60), ("Pi", 50), ("Ti", 40), ("Gi", 30), ("Mi", 20), ("Ki", 10)] {
                let scale = BigRational::from_integer(pow2(exp));
                let scaled = &amount.value / &scale;
                if scaled.is_integer() && !scaled.is_zero() {
                    return Quantity(format!("{}{suffix}", scaled.to_integer()));
                }
            }
            if amount.value.is_integer() {
                Quantity(amount.value.to_integer().to_string())
            } else {
                Quantity(format!("{:.0}", ratio_to_f64(&amount.value)))
            }
        }
    }
}

fn ratio_to_f64(r: &BigRational) -> f64 {
    let (numer, denom) = (r.numer(), r.denom());
    numer.to_string().parse::<f64>().unwrap_or(0.0) / denom.to_string().parse::<f64>().unwrap_or(1.0)
}
