//! Candle granularity codes used by the venues ("S5", "M15", "H4", "D", "W", "M").

use std::fmt;
use std::str::FromStr;

use chrono::Duration;

use crate::domain::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Seconds(u32),
    Minutes(u32),
    Hours(u32),
    Day,
    Week,
    Month,
}

impl Granularity {
    /// Map a period in minutes to the venue's granularity code.
    pub fn from_minutes(minutes: f64) -> Self {
        if minutes < 1.0 {
            Granularity::Seconds((minutes * 60.0).round().max(1.0) as u32)
        } else if minutes < 60.0 {
            Granularity::Minutes(minutes.trunc() as u32)
        } else if minutes < 60.0 * 24.0 {
            Granularity::Hours((minutes / 60.0).trunc() as u32)
        } else if minutes < 60.0 * 24.0 * 7.0 {
            Granularity::Day
        } else if minutes < 60.0 * 24.0 * 7.0 * 4.0 {
            Granularity::Week
        } else {
            Granularity::Month
        }
    }

    /// Nominal bar length. A month counts as 30 days.
    pub fn duration(&self) -> Duration {
        match self {
            Granularity::Seconds(s) => Duration::seconds(i64::from(*s)),
            Granularity::Minutes(m) => Duration::minutes(i64::from(*m)),
            Granularity::Hours(h) => Duration::hours(i64::from(*h)),
            Granularity::Day => Duration::days(1),
            Granularity::Week => Duration::weeks(1),
            Granularity::Month => Duration::days(30),
        }
    }
}

/// Exact period length for a minute count, sub-minute periods included.
pub fn period_duration(minutes: f64) -> Duration {
    Duration::seconds((minutes * 60.0).round() as i64)
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Seconds(s) => write!(f, "S{}", s),
            Granularity::Minutes(m) => write!(f, "M{}", m),
            Granularity::Hours(h) => write!(f, "H{}", h),
            Granularity::Day => write!(f, "D"),
            Granularity::Week => write!(f, "W"),
            Granularity::Month => write!(f, "M"),
        }
    }
}

impl FromStr for Granularity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::new("granularity", 0, format!("unknown granularity '{s}'"));
        match s {
            "D" => return Ok(Granularity::Day),
            "W" => return Ok(Granularity::Week),
            "M" => return Ok(Granularity::Month),
            _ => {}
        }
        let (unit, count) = s.split_at_checked(1).ok_or_else(err)?;
        let count: u32 = count.parse().map_err(|_| err())?;
        if count == 0 {
            return Err(err());
        }
        match unit {
            "S" => Ok(Granularity::Seconds(count)),
            "M" => Ok(Granularity::Minutes(count)),
            "H" => Ok(Granularity::Hours(count)),
            _ => Err(err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_to_code() {
        assert_eq!(Granularity::from_minutes(5.0 / 60.0).to_string(), "S5");
        assert_eq!(Granularity::from_minutes(1.0).to_string(), "M1");
        assert_eq!(Granularity::from_minutes(15.0).to_string(), "M15");
        assert_eq!(Granularity::from_minutes(59.0).to_string(), "M59");
        assert_eq!(Granularity::from_minutes(60.0).to_string(), "H1");
        assert_eq!(Granularity::from_minutes(240.0).to_string(), "H4");
        assert_eq!(Granularity::from_minutes(1439.0).to_string(), "H23");
        assert_eq!(Granularity::from_minutes(1440.0).to_string(), "D");
        assert_eq!(Granularity::from_minutes(10_079.0).to_string(), "D");
        assert_eq!(Granularity::from_minutes(10_080.0).to_string(), "W");
        assert_eq!(Granularity::from_minutes(40_320.0).to_string(), "M");
    }

    #[test]
    fn parse_codes() {
        assert_eq!("M15".parse::<Granularity>().unwrap(), Granularity::Minutes(15));
        assert_eq!("H4".parse::<Granularity>().unwrap(), Granularity::Hours(4));
        assert_eq!("S30".parse::<Granularity>().unwrap(), Granularity::Seconds(30));
        assert_eq!("M".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!("X3".parse::<Granularity>().is_err());
        assert!("M0".parse::<Granularity>().is_err());
        assert!("".parse::<Granularity>().is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(Granularity::Minutes(15).duration(), Duration::minutes(15));
        assert_eq!(period_duration(0.5), Duration::seconds(30));
        assert_eq!(period_duration(240.0), Duration::hours(4));
    }
}
