//! Container resource limits

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Memory ceiling applied when a quantity cannot be parsed: 512 MiB
pub const DEFAULT_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Default relative CPU weight
pub const DEFAULT_CPU_SHARES: i64 = 1024;

/// Memory ceiling and CPU weight for one container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_bytes: u64,
    pub cpu_shares: i64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: DEFAULT_MEMORY_BYTES,
            cpu_shares: DEFAULT_CPU_SHARES,
        }
    }
}

impl ResourceLimits {
    /// Build limits from a human-readable memory quantity and a CPU weight.
    ///
    /// Never fails: an unparseable quantity falls back to 512 MiB and a
    /// non-positive weight to the default.
    pub fn from_quantities(memory: &str, cpu_shares: i64) -> Self {
        let cpu_shares = if cpu_shares > 0 {
            cpu_shares
        } else {
            DEFAULT_CPU_SHARES
        };

        Self {
            memory_bytes: parse_memory(memory),
            cpu_shares,
        }
    }
}

/// Parse quantities like `512Mi` or `2G` into bytes.
///
/// Accepts `^\d+[KMGT]i?$`. Both the `Ki` and `K` spellings use binary
/// multipliers. Anything else yields [`DEFAULT_MEMORY_BYTES`].
pub fn parse_memory(quantity: &str) -> u64 {
    match try_parse_memory(quantity) {
        Some(bytes) => bytes,
        None => {
            warn!(
                "Unrecognized memory quantity {:?}, using default of {} bytes",
                quantity, DEFAULT_MEMORY_BYTES
            );
            DEFAULT_MEMORY_BYTES
        }
    }
}

fn try_parse_memory(quantity: &str) -> Option<u64> {
    let digits_end = quantity
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(quantity.len());
    if digits_end == 0 {
        return None;
    }

    let (digits, suffix) = quantity.split_at(digits_end);
    let shift = match suffix {
        "K" | "Ki" => 10,
        "M" | "Mi" => 20,
        "G" | "Gi" => 30,
        "T" | "Ti" => 40,
        _ => return None,
    };

    let value: u64 = digits.parse().ok()?;
    value.checked_mul(1u64 << shift)
}
