//! Kubernetes quantity parsing for node capacities and queue configs.

use anyhow::{Result, bail};

/// CPU quantities: "4" means 4 cores, "500m" means 500 milli-cores.
pub fn parse_cpu_value(value: &str) -> Result<i64> {
    let value = value.trim();
    if let Some(milli) = value.strip_suffix('m') {
        return Ok(milli.parse::<i64>()?);
    }
    if let Ok(cores) = value.parse::<i64>() {
        return Ok(cores * 1000);
    }
    // Fractional cores show up in allocatable occasionally.
    if let Ok(cores) = value.parse::<f64>() {
        return Ok((cores * 1000.0).round() as i64);
    }
    bail!("invalid cpu quantity: {value}")
}

/// Memory/storage quantities with binary (Ki/Mi/...) or decimal (k/M/...)
/// suffixes, in bytes.
pub fn parse_memory_value(value: &str) -> Result<i64> {
    let value = value.trim();
    let suffixes: [(&str, i64); 10] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("Pi", 1 << 50),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
    ];
    for (suffix, multiplier) in suffixes {
        if let Some(number) = value.strip_suffix(suffix) {
            return Ok((number.trim().parse::<f64>()? * multiplier as f64) as i64);
        }
    }
    Ok(value.parse::<i64>()?)
}

/// VRAM node labels are terse, e.g. "192G" or "24576M".
pub fn parse_gpu_vram_value(value: &str) -> i64 {
    parse_memory_value(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_quantities() {
        assert_eq!(parse_cpu_value("4").unwrap(), 4000);
        assert_eq!(parse_cpu_value("500m").unwrap(), 500);
        assert_eq!(parse_cpu_value("2.5").unwrap(), 2500);
        assert!(parse_cpu_value("lots").is_err());
    }

    #[test]
    fn memory_quantities() {
        assert_eq!(parse_memory_value("1024").unwrap(), 1024);
        assert_eq!(parse_memory_value("1Ki").unwrap(), 1024);
        assert_eq!(parse_memory_value("64Gi").unwrap(), 64 << 30);
        assert_eq!(parse_memory_value("1G").unwrap(), 1_000_000_000);
        assert!(parse_memory_value("plenty").is_err());
    }

    #[test]
    fn vram_labels_fall_back_to_zero() {
        assert_eq!(parse_gpu_vram_value("192G"), 192_000_000_000);
        assert_eq!(parse_gpu_vram_value("n/a"), 0);
    }
}
