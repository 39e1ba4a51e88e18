//! Conversion of memory figures into the canonical unit (gigabytes, 2 decimals).

const BINARY_STEP: f64 = 1024.0;

/// Units reported by the memory sources.
///
/// Every unit scales by 1024: the kernel's `kB` is really KiB, and the
/// container runtime prints binary prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUnit {
    KB,
    MB,
    GB,
    KiB,
    MiB,
    GiB,
}

impl MemoryUnit {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "kB" | "KB" => Some(MemoryUnit::KB),
            "MB" => Some(MemoryUnit::MB),
            "GB" => Some(MemoryUnit::GB),
            "KiB" => Some(MemoryUnit::KiB),
            "MiB" => Some(MemoryUnit::MiB),
            "GiB" => Some(MemoryUnit::GiB),
            _ => None,
        }
    }

    /// Number of this unit's steps below a gigabyte.
    fn steps_to_gigabytes(self) -> i32 {
        match self {
            MemoryUnit::KB | MemoryUnit::KiB => 2,
            MemoryUnit::MB | MemoryUnit::MiB => 1,
            MemoryUnit::GB | MemoryUnit::GiB => 0,
        }
    }
}

/// Converts `value` expressed in `unit` into gigabytes, fixed to 2 decimals.
pub fn normalize(value: f64, unit: MemoryUnit) -> f64 {
    let mut gigabytes = value;
    for _ in 0..unit.steps_to_gigabytes() {
        gigabytes /= BINARY_STEP;
    }
    round2(gigabytes)
}

/// Rounds through the decimal text form so the persisted value carries no
/// binary floating-point tail.
pub fn round2(value: f64) -> f64 {
    let fixed: f64 = format!("{value:.2}").parse().unwrap_or(0.0);
    // "-0.00" parses back to negative zero.
    if fixed == 0.0 { 0.0 } else { fixed }
}
