//! System-wide OS metrics: where they come from and what they become.
//!
//! Metrics are read either from the local `/proc` or, when the database runs
//! on another host, through the `rpgtop` helper schema installed there. Both
//! paths produce the same text, which the parsers turn into an [`OsSample`].

use std::path::Path;

use tracing::debug;

use super::parser::{
    CpuTicks, LoadAvg, MemInfo, parse_cpu_ticks, parse_diskstats, parse_loadavg, parse_meminfo,
    parse_net_dev, parse_uptime,
};
use crate::collector::traits::{Database, DbError, FileSystem};
use crate::snapshot::{DiffRange, Snapshot};

/// Clock ticks per second assumed when the host cannot tell us.
pub const CLK_TCK: u64 = 100;

/// Query returning the remote host's clock tick rate.
pub const CLOCK_TICKS_QUERY: &str = "SELECT rpgtop.clock_ticks()";

/// Counter columns of [`diskstats_snapshot`].
pub const DISKSTATS_DIFF: DiffRange = DiffRange::new(1, 9);

/// Counter columns of [`netdev_snapshot`].
pub const NETDEV_DIFF: DiffRange = DiffRange::new(1, 8);

/// OS files rpgtop reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcFile {
    Stat,
    Uptime,
    Meminfo,
    Loadavg,
    Diskstats,
    NetDev,
}

impl ProcFile {
    /// Name understood by `rpgtop.read_proc()`.
    pub fn name(self) -> &'static str {
        match self {
            ProcFile::Stat => "stat",
            ProcFile::Uptime => "uptime",
            ProcFile::Meminfo => "meminfo",
            ProcFile::Loadavg => "loadavg",
            ProcFile::Diskstats => "diskstats",
            ProcFile::NetDev => "net/dev",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            ProcFile::Stat => "/proc/stat",
            ProcFile::Uptime => "/proc/uptime",
            ProcFile::Meminfo => "/proc/meminfo",
            ProcFile::Loadavg => "/proc/loadavg",
            ProcFile::Diskstats => "/proc/diskstats",
            ProcFile::NetDev => "/proc/net/dev",
        }
    }
}

/// Source of `/proc` file contents.
pub trait ProcReader {
    /// Contents of `file`, or `None` when it cannot be read.
    fn read_proc(&mut self, file: ProcFile) -> Option<String>;
}

/// Reads `/proc` of the host rpgtop runs on.
#[derive(Debug, Clone)]
pub struct LocalProc<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> LocalProc<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }
}

impl<F: FileSystem> ProcReader for LocalProc<F> {
    fn read_proc(&mut self, file: ProcFile) -> Option<String> {
        match self.fs.read_to_string(Path::new(file.path())) {
            Ok(content) => Some(content),
            Err(e) => {
                debug!("cannot read {}: {}", file.path(), e);
                None
            }
        }
    }
}

/// Reads `/proc` of the database host through `rpgtop.read_proc()`.
///
/// A failed call marks the helper as missing so that later cycles skip the
/// round trip; a lost connection is kept in `connection_error` for the
/// caller to act on.
pub struct RemoteProc<'a, D: Database> {
    db: &'a mut D,
    available: &'a mut bool,
    pub connection_error: Option<DbError>,
}

impl<'a, D: Database> RemoteProc<'a, D> {
    pub fn new(db: &'a mut D, available: &'a mut bool) -> Self {
        Self {
            db,
            available,
            connection_error: None,
        }
    }
}

impl<D: Database> ProcReader for RemoteProc<'_, D> {
    fn read_proc(&mut self, file: ProcFile) -> Option<String> {
        if !*self.available || self.connection_error.is_some() {
            return None;
        }

        let sql = format!("SELECT rpgtop.read_proc('{}')", file.name());
        match self.db.query(&sql) {
            Ok(result) => result.cell(0, 0).map(str::to_string),
            Err(e @ DbError::Connection(_)) => {
                self.connection_error = Some(e);
                None
            }
            Err(DbError::Query(msg)) if helper_missing(&msg) => {
                debug!("rpgtop helper schema unavailable, OS metrics disabled: {}", msg);
                *self.available = false;
                None
            }
            Err(DbError::Query(msg)) => {
                debug!("cannot read {} through helper schema: {}", file.name(), msg);
                None
            }
        }
    }
}

/// Undefined schema or function: the helper is not installed.
fn helper_missing(message: &str) -> bool {
    message.contains("rpgtop") && message.contains("does not exist")
}

/// One reading of the OS-wide metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OsSample {
    pub cpu: CpuTicks,
    /// Seconds since boot; `None` when uptime could not be read.
    pub uptime: Option<f64>,
    pub mem: MemInfo,
    pub load: LoadAvg,
}

/// Reads an [`OsSample`]; unreadable parts are left zeroed.
pub fn read_os_sample(reader: &mut dyn ProcReader) -> OsSample {
    let mut sample = OsSample::default();

    if let Some(text) = reader.read_proc(ProcFile::Stat) {
        match parse_cpu_ticks(&text) {
            Ok(cpu) => sample.cpu = cpu,
            Err(e) => debug!("stat: {}", e),
        }
    }
    if let Some(text) = reader.read_proc(ProcFile::Uptime) {
        sample.uptime = parse_uptime(&text).ok();
    }
    if let Some(text) = reader.read_proc(ProcFile::Meminfo) {
        match parse_meminfo(&text) {
            Ok(mem) => sample.mem = mem,
            Err(e) => debug!("meminfo: {}", e),
        }
    }
    if let Some(text) = reader.read_proc(ProcFile::Loadavg) {
        match parse_loadavg(&text) {
            Ok(load) => sample.load = load,
            Err(e) => debug!("loadavg: {}", e),
        }
    }

    sample
}

/// CPU time split by mode, in percent of the interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuUsage {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
}

impl CpuUsage {
    /// Usage between two readings. All zero when no ticks elapsed or the
    /// counters went backwards (host rebooted between samples).
    pub fn between(previous: &CpuTicks, current: &CpuTicks) -> Self {
        let total = current.total().saturating_sub(previous.total());
        if total == 0 || current.total() < previous.total() {
            return Self::default();
        }

        let share = |cur: u64, prev: u64| cur.saturating_sub(prev) as f64 * 100.0 / total as f64;
        Self {
            user: share(current.user, previous.user),
            nice: share(current.nice, previous.nice),
            system: share(current.system, previous.system),
            idle: share(current.idle, previous.idle),
            iowait: share(current.iowait, previous.iowait),
            irq: share(current.irq, previous.irq),
            softirq: share(current.softirq, previous.softirq),
            steal: share(current.steal, previous.steal),
        }
    }
}

/// Memory usage in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemUsage {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub buffers: u64,
    pub cached: u64,
    pub dirty: u64,
    pub writeback: u64,
    pub slab: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub swap_used: u64,
}

impl From<&MemInfo> for MemUsage {
    fn from(m: &MemInfo) -> Self {
        let mib = |kb: u64| kb / 1024;
        let used = m
            .mem_total
            .saturating_sub(m.mem_free)
            .saturating_sub(m.buffers)
            .saturating_sub(m.cached);
        Self {
            total: mib(m.mem_total),
            free: mib(m.mem_free),
            used: mib(used),
            buffers: mib(m.buffers),
            cached: mib(m.cached),
            dirty: mib(m.dirty),
            writeback: mib(m.writeback),
            slab: mib(m.slab),
            swap_total: mib(m.swap_total),
            swap_free: mib(m.swap_free),
            swap_used: mib(m.swap_total.saturating_sub(m.swap_free)),
        }
    }
}

/// Block device counters as a table keyed by device name.
///
/// Sector counts are converted to KiB; `in_flight` is a gauge and sits
/// outside [`DISKSTATS_DIFF`].
pub fn diskstats_snapshot(content: &str) -> Snapshot {
    const COLUMNS: [&str; 11] = [
        "device", "reads", "writes", "read_kib", "write_kib", "r_merged", "w_merged", "read_ms",
        "write_ms", "busy_ms", "in_flight",
    ];

    let rows: Vec<Vec<String>> = match parse_diskstats(content) {
        Ok(disks) => disks
            .into_iter()
            .map(|d| {
                vec![
                    d.device,
                    d.reads.to_string(),
                    d.writes.to_string(),
                    (d.read_sectors / 2).to_string(),
                    (d.write_sectors / 2).to_string(),
                    d.r_merged.to_string(),
                    d.w_merged.to_string(),
                    d.read_time.to_string(),
                    d.write_time.to_string(),
                    d.io_time.to_string(),
                    d.io_in_progress.to_string(),
                ]
            })
            .collect(),
        Err(e) => return Snapshot::failed(owned(&COLUMNS), e.to_string()),
    };

    text_table(&COLUMNS, rows)
}

/// Network interface counters as a table keyed by interface name.
pub fn netdev_snapshot(content: &str) -> Snapshot {
    const COLUMNS: [&str; 9] = [
        "interface", "rx_kib", "rx_packets", "rx_errs", "rx_drop", "tx_kib", "tx_packets",
        "tx_errs", "tx_drop",
    ];

    let rows: Vec<Vec<String>> = match parse_net_dev(content) {
        Ok(devs) => devs
            .into_iter()
            .map(|d| {
                vec![
                    d.interface,
                    (d.rx_bytes / 1024).to_string(),
                    d.rx_packets.to_string(),
                    d.rx_errs.to_string(),
                    d.rx_drop.to_string(),
                    (d.tx_bytes / 1024).to_string(),
                    d.tx_packets.to_string(),
                    d.tx_errs.to_string(),
                    d.tx_drop.to_string(),
                ]
            })
            .collect(),
        Err(e) => return Snapshot::failed(owned(&COLUMNS), e.to_string()),
    };

    text_table(&COLUMNS, rows)
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

fn text_table(columns: &[&str], rows: Vec<Vec<String>>) -> Snapshot {
    Snapshot::new(
        owned(columns),
        rows.into_iter()
            .map(|row| row.into_iter().map(Some).collect())
            .collect(),
    )
}
