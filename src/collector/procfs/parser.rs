//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions over file contents, so the same code serves the
//! local `/proc` and text fetched from a remote host through the helper schema.

use thiserror::Error;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Parse error: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Parsed data from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub dirty: u64,
    pub writeback: u64,
    pub slab: u64,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut seen_total = false;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let kb: u64 = value.parse().unwrap_or(0);

        match key {
            "MemTotal:" => {
                info.mem_total = kb;
                seen_total = true;
            }
            "MemFree:" => info.mem_free = kb,
            "MemAvailable:" => info.mem_available = kb,
            "Buffers:" => info.buffers = kb,
            "Cached:" => info.cached = kb,
            "SwapTotal:" => info.swap_total = kb,
            "SwapFree:" => info.swap_free = kb,
            "Dirty:" => info.dirty = kb,
            "Writeback:" => info.writeback = kb,
            "Slab:" => info.slab = kb,
            _ => {}
        }
    }

    if !seen_total {
        return Err(ParseError::new("MemTotal missing from meminfo"));
    }
    Ok(info)
}

/// Aggregate CPU time from the `cpu` line of `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTicks {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
pub fn parse_cpu_ticks(content: &str) -> Result<CpuTicks, ParseError> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| ParseError::new("no aggregate cpu line in stat"))?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(ParseError::new("truncated cpu line in stat"));
    }
    let get_val = |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

    Ok(CpuTicks {
        user: get_val(1),
        nice: get_val(2),
        system: get_val(3),
        idle: get_val(4),
        iowait: get_val(5),
        irq: get_val(6),
        softirq: get_val(7),
        steal: get_val(8),
    })
}

/// Parses `/proc/uptime` into seconds since boot.
pub fn parse_uptime(content: &str) -> Result<f64, ParseError> {
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| ParseError::new("invalid uptime"))
}

/// Parsed data from `/proc/loadavg`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAvg {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// Parses `/proc/loadavg` content.
pub fn parse_loadavg(content: &str) -> Result<LoadAvg, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(ParseError::new("invalid loadavg format"));
    }

    let load1 = parts[0]
        .parse()
        .map_err(|_| ParseError::new("invalid load1"))?;
    let load5 = parts[1]
        .parse()
        .map_err(|_| ParseError::new("invalid load5"))?;
    let load15 = parts[2]
        .parse()
        .map_err(|_| ParseError::new("invalid load15"))?;

    Ok(LoadAvg {
        load1,
        load5,
        load15,
    })
}

/// Parsed data from `/proc/diskstats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskStats {
    /// Device name (sda, nvme0n1, etc.)
    pub device: String,
    /// Number of reads completed
    pub reads: u64,
    /// Number of read requests merged
    pub r_merged: u64,
    /// Number of sectors read
    pub read_sectors: u64,
    /// Time spent reading (ms)
    pub read_time: u64,
    /// Number of writes completed
    pub writes: u64,
    /// Number of write requests merged
    pub w_merged: u64,
    /// Number of sectors written
    pub write_sectors: u64,
    /// Time spent writing (ms)
    pub write_time: u64,
    /// Number of I/Os currently in progress
    pub io_in_progress: u64,
    /// Time spent doing I/Os (ms)
    pub io_time: u64,
}

/// Parses `/proc/diskstats` content.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged w_sectors w_time io_pending io_time w_io_time [discards ...]
pub fn parse_diskstats(content: &str) -> Result<Vec<DiskStats>, ParseError> {
    let mut disks = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }

        let get_val =
            |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        disks.push(DiskStats {
            device: parts[2].to_string(),
            reads: get_val(3),
            r_merged: get_val(4),
            read_sectors: get_val(5),
            read_time: get_val(6),
            writes: get_val(7),
            w_merged: get_val(8),
            write_sectors: get_val(9),
            write_time: get_val(10),
            io_in_progress: get_val(11),
            io_time: get_val(12),
        });
    }

    Ok(disks)
}

/// Parsed data from `/proc/net/dev`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetDevStats {
    /// Interface name (eth0, lo, etc.)
    pub interface: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
}

/// Parses `/proc/net/dev` content.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
pub fn parse_net_dev(content: &str) -> Result<Vec<NetDevStats>, ParseError> {
    let mut devices = Vec::new();

    for line in content.lines() {
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }

        let Some((interface, counters)) = line.split_once(':') else {
            continue;
        };
        let values: Vec<&str> = counters.split_whitespace().collect();
        if values.len() < 16 {
            continue;
        }

        let get_val =
            |idx: usize| -> u64 { values.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        devices.push(NetDevStats {
            interface: interface.trim().to_string(),
            rx_bytes: get_val(0),
            rx_packets: get_val(1),
            rx_errs: get_val(2),
            rx_drop: get_val(3),
            tx_bytes: get_val(8),
            tx_packets: get_val(9),
            tx_errs: get_val(10),
            tx_drop: get_val(11),
        });
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        let content = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:        12345 kB
SwapTotal:       4096000 kB
SwapFree:        3072000 kB
Slab:             512000 kB
";
        let info = parse_meminfo(content).unwrap();
        assert_eq!(info.mem_total, 16384000);
        assert_eq!(info.cached, 2048000);
        assert_eq!(info.swap_free, 3072000);
        assert_eq!(info.slab, 512000);
    }

    #[test]
    fn test_parse_meminfo_without_total_fails() {
        assert!(parse_meminfo("MemFree: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_cpu_ticks() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 7 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
ctxt 500000
";
        let ticks = parse_cpu_ticks(content).unwrap();
        assert_eq!(ticks.user, 10000);
        assert_eq!(ticks.idle, 80000);
        assert_eq!(ticks.steal, 7);
        assert_eq!(ticks.total(), 94807);
    }

    #[test]
    fn test_parse_cpu_ticks_old_kernel() {
        // Kernels before 2.6 report only four fields.
        let ticks = parse_cpu_ticks("cpu 1 2 3 4\n").unwrap();
        assert_eq!(ticks.total(), 10);
        assert_eq!(ticks.iowait, 0);
    }

    #[test]
    fn test_parse_cpu_ticks_missing_line() {
        assert!(parse_cpu_ticks("cpu0 1 2 3 4\n").is_err());
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("12345.67 98765.43\n").unwrap(), 12345.67);
        assert!(parse_uptime("").is_err());
        assert!(parse_uptime("abc").is_err());
    }

    #[test]
    fn test_parse_loadavg() {
        let load = parse_loadavg("0.15 0.10 0.05 1/150 1234\n").unwrap();
        assert_eq!(load.load1, 0.15);
        assert_eq!(load.load15, 0.05);
        assert!(parse_loadavg("0.15\n").is_err());
    }

    #[test]
    fn test_parse_diskstats() {
        let content = "\
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000
 broken line
";
        let disks = parse_diskstats(content).unwrap();
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].device, "sda");
        assert_eq!(disks[0].read_sectors, 987654);
        assert_eq!(disks[1].io_in_progress, 5);
        assert_eq!(disks[1].io_time, 15000);
    }

    #[test]
    fn test_parse_net_dev() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0: 987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
";
        let devs = parse_net_dev(content).unwrap();
        assert_eq!(devs.len(), 2);
        assert_eq!(devs[1].interface, "eth0");
        assert_eq!(devs[1].rx_drop, 10);
        assert_eq!(devs[1].tx_bytes, 123456789);
        assert_eq!(devs[1].tx_drop, 5);
    }
}
