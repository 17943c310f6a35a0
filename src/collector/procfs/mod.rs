//! OS metrics from `/proc`.

mod parser;
mod system;

pub use parser::{
    CpuTicks, DiskStats, LoadAvg, MemInfo, NetDevStats, ParseError, parse_cpu_ticks,
    parse_diskstats, parse_loadavg, parse_meminfo, parse_net_dev, parse_uptime,
};
pub use system::{
    CLK_TCK, CLOCK_TICKS_QUERY, CpuUsage, DISKSTATS_DIFF, LocalProc, MemUsage, NETDEV_DIFF,
    OsSample, ProcFile, ProcReader, RemoteProc, diskstats_snapshot, netdev_snapshot,
    read_os_sample,
};
