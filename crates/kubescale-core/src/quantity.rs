//! Kubernetes-style resource quantities and human-readable durations.
//!
//! Quotas and requests are written the way a cluster operator writes them
//! (`"2000m"`, `"4Gi"`, `"2s"`) and parsed into integer units at the
//! boundary. All three types serialize back to their canonical string form.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// CPU in millicores (`"250m"`, `"2"`, `"0.5"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuMillis(pub u64);

/// Memory in bytes (`"128Mi"`, `"4Gi"`, `"500M"`, `"1024"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryBytes(pub u64);

/// A duration written as `"500ms"`, `"2s"`, `"5m"` or `"1h"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumanDuration(pub Duration);

const KI: u64 = 1024;
const MI: u64 = KI * 1024;
const GI: u64 = MI * 1024;
const TI: u64 = GI * 1024;

impl CpuMillis {
    pub fn from_cores(cores: u64) -> Self {
        Self(cores * 1000)
    }

    pub fn saturating_mul(self, n: u32) -> Self {
        Self(self.0.saturating_mul(n as u64))
    }
}

impl MemoryBytes {
    pub fn from_mebibytes(mib: u64) -> Self {
        Self(mib * MI)
    }

    pub fn from_gibibytes(gib: u64) -> Self {
        Self(gib * GI)
    }

    pub fn saturating_mul(self, n: u32) -> Self {
        Self(self.0.saturating_mul(n as u64))
    }
}

impl HumanDuration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for CpuMillis {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ValidationError::InvalidQuantity(s.to_string());
        if let Some(millis) = s.strip_suffix('m') {
            return millis.parse::<u64>().map(CpuMillis).map_err(|_| invalid());
        }
        let cores: f64 = s.parse().map_err(|_| invalid())?;
        if !cores.is_finite() || cores < 0.0 {
            return Err(invalid());
        }
        Ok(CpuMillis((cores * 1000.0).round() as u64))
    }
}

impl FromStr for MemoryBytes {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ValidationError::InvalidQuantity(s.to_string());
        let suffixes: [(&str, u64); 8] = [
            ("Ki", KI),
            ("Mi", MI),
            ("Gi", GI),
            ("Ti", TI),
            ("K", 1_000),
            ("M", 1_000_000),
            ("G", 1_000_000_000),
            ("T", 1_000_000_000_000),
        ];
        for (suffix, unit) in suffixes {
            if let Some(num) = s.strip_suffix(suffix) {
                let n = num.parse::<u64>().map_err(|_| invalid())?;
                return n.checked_mul(unit).map(MemoryBytes).ok_or_else(invalid);
            }
        }
        s.parse::<u64>().map(MemoryBytes).map_err(|_| invalid())
    }
}

impl FromStr for HumanDuration {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ValidationError::InvalidDuration(s.to_string());
        let parse = |n: &str| n.parse::<u64>().map_err(|_| invalid());
        // "ms" must be checked before "s" and "m".
        let d = if let Some(ms) = s.strip_suffix("ms") {
            Duration::from_millis(parse(ms)?)
        } else if let Some(secs) = s.strip_suffix('s') {
            Duration::from_secs(parse(secs)?)
        } else if let Some(mins) = s.strip_suffix('m') {
            Duration::from_secs(parse(mins)?.checked_mul(60).ok_or_else(invalid)?)
        } else if let Some(hours) = s.strip_suffix('h') {
            Duration::from_secs(parse(hours)?.checked_mul(3600).ok_or_else(invalid)?)
        } else {
            return Err(invalid());
        };
        Ok(HumanDuration(d))
    }
}

impl fmt::Display for CpuMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl fmt::Display for MemoryBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        if b != 0 && b % GI == 0 {
            write!(f, "{}Gi", b / GI)
        } else if b != 0 && b % MI == 0 {
            write!(f, "{}Mi", b / MI)
        } else if b != 0 && b % KI == 0 {
            write!(f, "{}Ki", b / KI)
        } else {
            write!(f, "{b}")
        }
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis();
        if ms % 1000 != 0 {
            write!(f, "{ms}ms")
        } else {
            write!(f, "{}s", ms / 1000)
        }
    }
}

macro_rules! string_conversions {
    ($ty:ty) => {
        impl TryFrom<String> for $ty {
            type Error = ValidationError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$ty> for String {
            fn from(v: $ty) -> String {
                v.to_string()
            }
        }
    };
}

string_conversions!(CpuMillis);
string_conversions!(MemoryBytes);
string_conversions!(HumanDuration);
