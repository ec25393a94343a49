use simple_error::SimpleError;
use std::{cmp::Ordering, fmt, str::FromStr};

/// The store's numbers carry at most this many significant digits.
const MAX_DIGITS: usize = 38;

/// A numeric sort key. Any number the store accepts is representable, including fractions and
/// integers beyond 64 bits. It's held in canonical decimal form, so equal numbers written
/// differently ("1.50", "1.5", "15e-1") compare, hash, and print identically.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortKey(String);

impl SortKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key as an `i64` if it's an integer in range.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    fn is_negative(&self) -> bool {
        self.0.starts_with('-')
    }
}

impl FromStr for SortKey {
    type Err = SimpleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SimpleError::new(format!("invalid sort key: {:?}", s));

        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (mantissa, exponent) = match unsigned.find(|c| c == 'e' || c == 'E') {
            Some(i) => (&unsigned[..i], unsigned[i + 1..].parse::<i64>().map_err(|_| invalid())?),
            None => (unsigned, 0),
        };
        let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if (int.is_empty() && frac.is_empty()) || !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        // `digits` with the decimal point `point` places from its left end
        let mut digits = format!("{}{}", int, frac);
        let mut point = int.len() as i64 + exponent;
        let leading = digits.len() - digits.trim_start_matches('0').len();
        digits.replace_range(..leading, "");
        point -= leading as i64;
        digits.truncate(digits.trim_end_matches('0').len());

        if digits.is_empty() {
            return Ok(Self("0".to_string()));
        }
        if digits.len() > MAX_DIGITS || !(-130..=126).contains(&point) {
            return Err(invalid());
        }

        let magnitude = if point <= 0 {
            format!("0.{}{}", "0".repeat(-point as usize), digits)
        } else if point as usize >= digits.len() {
            format!("{}{}", digits, "0".repeat(point as usize - digits.len()))
        } else {
            let (i, f) = digits.split_at(point as usize);
            format!("{}.{}", i, f)
        };
        Ok(Self(if negative { format!("-{}", magnitude) } else { magnitude }))
    }
}

/// Compares two non-negative canonical decimals.
fn cmp_magnitude(a: &str, b: &str) -> Ordering {
    let (ai, af) = a.split_once('.').unwrap_or((a, ""));
    let (bi, bf) = b.split_once('.').unwrap_or((b, ""));
    ai.len().cmp(&bi.len()).then_with(|| ai.cmp(bi)).then_with(|| af.cmp(bf))
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_negative(), other.is_negative()) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => cmp_magnitude(&self.0, &other.0),
            (true, true) => cmp_magnitude(&other.0[1..], &self.0[1..]),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for SortKey {
                fn from(v: $t) -> Self {
                    Self(v.to_string())
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

#[cfg(test)]
mod test {
    use super::*;

    fn sk(s: &str) -> SortKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_canonical_form() {
        assert_eq!(sk("1.50").as_str(), "1.5");
        assert_eq!(sk("+0015").as_str(), "15");
        assert_eq!(sk("15e-1").as_str(), "1.5");
        assert_eq!(sk("1.5E2").as_str(), "150");
        assert_eq!(sk(".25").as_str(), "0.25");
        assert_eq!(sk("-0.0").as_str(), "0");
        assert_eq!(sk("-7").as_str(), "-7");
        assert_eq!(sk("9223372036854775808").as_str(), "9223372036854775808");
        assert_eq!(sk("1.5"), sk("1.500"));
    }

    #[test]
    fn test_invalid() {
        for s in ["", "-", ".", "abc", "1.2.3", "1e", "1e5x", " 1", "0x10"] {
            assert!(s.parse::<SortKey>().is_err(), "{:?} should be rejected", s);
        }
        assert!("1".repeat(39).parse::<SortKey>().is_err());
    }

    #[test]
    fn test_numeric_order() {
        let mut keys: Vec<SortKey> = ["10", "-1", "2.5", "9223372036854775808", "0", "-1.5", "2", "0.05", "-10", "2.45"]
            .iter()
            .map(|s| sk(s))
            .collect();
        keys.sort();
        let sorted: Vec<_> = keys.iter().map(SortKey::as_str).collect();
        assert_eq!(
            sorted,
            vec!["-10", "-1.5", "-1", "0", "0.05", "2", "2.45", "2.5", "10", "9223372036854775808"]
        );
    }

    #[test]
    fn test_integers() {
        assert_eq!(SortKey::from(-1), sk("-1"));
        assert_eq!(SortKey::from(42u64).as_i64(), Some(42));
        assert_eq!(sk("1.5").as_i64(), None);
        assert_eq!(sk("9223372036854775808").as_i64(), None);
    }
}
