//! Time-to-live values.
//!
//! A [`Ttl`] is either finite (including zero, which means "discard
//! immediately") or unlimited. TTLs order naturally: every finite TTL is
//! shorter than [`Ttl::Unlimited`].
//!
//! The textual form accepted by [`FromStr`] and by configuration files is
//! `"0"`, `"unlimited"`, or an integer followed by a unit (`ns`, `us`, `ms`,
//! `s`, `m`, `h`, `d`, or their long names). A bare integer is seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How long a value may be kept.
///
/// # Example
///
/// ```
/// use janus_core::Ttl;
/// use std::time::Duration;
///
/// let ttl: Ttl = "30s".parse().unwrap();
/// assert_eq!(ttl, Ttl::Finite(Duration::from_secs(30)));
/// assert_eq!(ttl.cap(Some(Duration::from_secs(10))), Ttl::from_secs(10));
/// assert_eq!(Ttl::Unlimited.cap(None), Ttl::Unlimited);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "TtlRepr", into = "String")]
pub enum Ttl {
    /// Keep for the given duration. A zero duration means "do not keep".
    Finite(Duration),
    /// Keep until explicitly removed.
    Unlimited,
}

impl Ttl {
    /// Do not keep at all.
    pub const ZERO: Self = Self::Finite(Duration::ZERO);

    /// A finite TTL of `secs` seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self::Finite(Duration::from_secs(secs))
    }

    /// A finite TTL of `millis` milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self::Finite(Duration::from_millis(millis))
    }

    /// Returns `true` for a zero TTL.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Finite(d) if d.is_zero())
    }

    /// Returns `true` for an unlimited TTL.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Returns the duration of a finite TTL.
    #[must_use]
    pub const fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Finite(d) => Some(*d),
            Self::Unlimited => None,
        }
    }

    /// Caps this TTL at `max`, if a maximum is set.
    #[must_use]
    pub fn cap(self, max: Option<Duration>) -> Self {
        match max {
            Some(max) => self.min(Self::Finite(max)),
            None => self,
        }
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Self::Finite(duration)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u128, &str); 7] = [
            (86_400_000_000_000, "d"),
            (3_600_000_000_000, "h"),
            (60_000_000_000, "m"),
            (1_000_000_000, "s"),
            (1_000_000, "ms"),
            (1_000, "us"),
            (1, "ns"),
        ];

        let duration = match self {
            Self::Unlimited => return f.write_str("unlimited"),
            Self::Finite(d) if d.is_zero() => return f.write_str("0"),
            Self::Finite(d) => d,
        };
        let nanos = duration.as_nanos();
        let (size, unit) = UNITS
            .iter()
            .find(|(size, _)| nanos % size == 0)
            .copied()
            .unwrap_or((1, "ns"));
        write!(f, "{}{}", nanos / size, unit)
    }
}

/// Error returned when a TTL string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid TTL '{input}': {reason}")]
pub struct ParseTtlError {
    input: String,
    reason: &'static str,
}

impl ParseTtlError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl FromStr for Ttl {
    type Err = ParseTtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim().to_ascii_lowercase();
        match input.as_str() {
            "" => return Err(ParseTtlError::new(s, "empty value")),
            "0" | "zero" | "none" => return Ok(Self::ZERO),
            "unlimited" | "infinite" | "forever" => return Ok(Self::Unlimited),
            _ => {}
        }

        let split = input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len());
        let (digits, unit) = input.split_at(split);
        let amount: u64 = digits
            .parse()
            .map_err(|_| ParseTtlError::new(s, "expected an integer amount"))?;

        let duration = match unit.trim() {
            "ns" | "nanos" => Duration::from_nanos(amount),
            "us" | "micros" => Duration::from_micros(amount),
            "ms" | "millis" | "milliseconds" => Duration::from_millis(amount),
            "" | "s" | "sec" | "secs" | "second" | "seconds" => Duration::from_secs(amount),
            "m" | "min" | "mins" | "minute" | "minutes" => amount
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| ParseTtlError::new(s, "amount too large"))?,
            "h" | "hour" | "hours" => amount
                .checked_mul(3_600)
                .map(Duration::from_secs)
                .ok_or_else(|| ParseTtlError::new(s, "amount too large"))?,
            "d" | "day" | "days" => amount
                .checked_mul(86_400)
                .map(Duration::from_secs)
                .ok_or_else(|| ParseTtlError::new(s, "amount too large"))?,
            _ => return Err(ParseTtlError::new(s, "unknown unit")),
        };
        Ok(Self::Finite(duration))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TtlRepr {
    Seconds(u64),
    Text(String),
}

impl TryFrom<TtlRepr> for Ttl {
    type Error = ParseTtlError;

    fn try_from(repr: TtlRepr) -> Result<Self, Self::Error> {
        match repr {
            TtlRepr::Seconds(secs) => Ok(Self::from_secs(secs)),
            TtlRepr::Text(text) => text.parse(),
        }
    }
}

impl From<Ttl> for String {
    fn from(ttl: Ttl) -> Self {
        ttl.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_keywords() {
        assert_eq!("0".parse::<Ttl>().unwrap(), Ttl::ZERO);
        assert_eq!(" Unlimited ".parse::<Ttl>().unwrap(), Ttl::Unlimited);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!("150ms".parse::<Ttl>().unwrap(), Ttl::from_millis(150));
        assert_eq!("45".parse::<Ttl>().unwrap(), Ttl::from_secs(45));
        assert_eq!("5 minutes".parse::<Ttl>().unwrap(), Ttl::from_secs(300));
        assert_eq!("2h".parse::<Ttl>().unwrap(), Ttl::from_secs(7_200));
        assert_eq!("1d".parse::<Ttl>().unwrap(), Ttl::from_secs(86_400));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Ttl>().is_err());
        assert!("soon".parse::<Ttl>().is_err());
        assert!("10 fortnights".parse::<Ttl>().is_err());
        assert!(format!("{}d", u64::MAX).parse::<Ttl>().is_err());
    }

    #[test]
    fn test_display_picks_largest_exact_unit() {
        assert_eq!(Ttl::from_secs(120).to_string(), "2m");
        assert_eq!(Ttl::from_millis(1_500).to_string(), "1500ms");
        assert_eq!(Ttl::ZERO.to_string(), "0");
        assert_eq!(Ttl::Unlimited.to_string(), "unlimited");
    }

    #[test]
    fn test_ordering_and_cap() {
        assert!(Ttl::ZERO < Ttl::from_secs(1));
        assert!(Ttl::from_secs(u64::MAX) < Ttl::Unlimited);

        let max = Some(Duration::from_secs(10));
        assert_eq!(Ttl::from_secs(30).cap(max), Ttl::from_secs(10));
        assert_eq!(Ttl::from_secs(3).cap(max), Ttl::from_secs(3));
        assert_eq!(Ttl::Unlimited.cap(max), Ttl::from_secs(10));
        assert_eq!(Ttl::Unlimited.cap(None), Ttl::Unlimited);
    }

    #[test]
    fn test_serde_accepts_strings_and_integers() {
        #[derive(Deserialize, Serialize)]
        struct Holder {
            ttl: Ttl,
        }

        let holder: Holder = serde_json::from_str(r#"{"ttl": "90s"}"#).unwrap();
        assert_eq!(holder.ttl, Ttl::from_secs(90));

        let holder: Holder = serde_json::from_str(r#"{"ttl": 12}"#).unwrap();
        assert_eq!(holder.ttl, Ttl::from_secs(12));

        assert!(serde_json::from_str::<Holder>(r#"{"ttl": "later"}"#).is_err());
        assert_eq!(
            serde_json::to_string(&Holder { ttl: Ttl::Unlimited }).unwrap(),
            r#"{"ttl":"unlimited"}"#
        );
    }

    proptest! {
        #[test]
        fn cap_never_exceeds_max(secs in 0u64..100_000, max in 0u64..100_000) {
            let max = Duration::from_secs(max);
            let capped = Ttl::from_secs(secs).cap(Some(max));
            prop_assert!(capped <= Ttl::Finite(max));
            prop_assert_eq!(capped.cap(Some(max)), capped);
        }

        #[test]
        fn display_parses_back(nanos in 1u64..u64::MAX) {
            let ttl = Ttl::Finite(Duration::from_nanos(nanos));
            prop_assert_eq!(ttl.to_string().parse::<Ttl>().unwrap(), ttl);
        }
    }
}
