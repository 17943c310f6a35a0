//! Pre-built mock filesystem scenarios for testing.
//!
//! `typical_system()` is a four-core host; `advance_one_second()` rewrites it
//! as it looks exactly one second (100 ticks) later, with known deltas:
//!
//! - CPU: user +20, system +10, idle +60, iowait +10 ticks
//! - sda: +100 reads, +50 writes, +2048 read sectors, +1024 written sectors
//! - eth0: +1048576 rx bytes, +2048 tx bytes, +700 rx packets

use super::filesystem::MockFs;

impl MockFs {
    /// Creates a typical system with the OS files rpgtop reads.
    pub fn typical_system() -> Self {
        let fs = Self::new();

        fs.add_file("/proc/uptime", "12345.67 98765.43\n");
        fs.add_file("/proc/loadavg", "0.15 0.10 0.05 1/150 1234\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       4096000 kB
SwapFree:        3072000 kB
Dirty:              1024 kB
Writeback:             0 kB
Slab:             512000 kB
SReclaimable:     256000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );
        fs.add_file(
            "/proc/diskstats",
            "\
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
   8       1 sda1 10000 80 800000 4000 5000 40 400000 2500 0 3500 6500 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000 0 0 0 0
",
        );
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0: 987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
",
        );

        fs
    }

    /// Moves a `typical_system()` one second forward.
    pub fn advance_one_second(&self) {
        self.add_file("/proc/uptime", "12346.67 98769.43\n");
        self.add_file(
            "/proc/stat",
            "\
cpu  10020 500 3010 80060 1010 200 100 0 0 0
ctxt 501000
btime 1700000000
",
        );
        self.add_file(
            "/proc/diskstats",
            "\
   8       0 sda 12445 100 989702 5000 6839 50 457813 3000 0 4500 8000 0 0 0 0
   8       1 sda1 10000 80 800000 4000 5000 40 400000 2500 0 3500 6500 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000 0 0 0 0
",
        );
        self.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0: 988702897   655021    5   10    0     0          0       100 123458837   456789    2    5    0     0       0          0
",
        );
    }
}
