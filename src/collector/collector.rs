//! One update cycle of the monitor.
//!
//! A [`Collector`] owns the database session, the OS metrics source and the
//! active [`View`]. Each call to [`Collector::update`] samples both, turns
//! counters into per-second rates against the previous sample and produces a
//! [`Stat`] ready for display.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::procfs::{
    CLK_TCK, CLOCK_TICKS_QUERY, CpuUsage, DISKSTATS_DIFF, LoadAvg, MemUsage, NETDEV_DIFF,
    OsSample, ProcFile, ProcReader, RemoteProc, diskstats_snapshot, netdev_snapshot,
    read_os_sample,
};
use super::traits::{Database, DbError};
use crate::snapshot::{AlignStatus, ColumnWidths, DiffRange, Snapshot, align, diff, sort};
use crate::view::{ExtraStat, View, ViewError};

/// Default truncation limit for displayed values.
pub const DEFAULT_TRUNCATE: usize = 32;

/// Error that ends a collection loop.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("lost connection to the database: {0}")]
    Connection(String),
    #[error("cannot start collector thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("collector thread panicked")]
    Panicked,
}

/// Display settings of the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Values this long or longer are cut; 0 disables truncation.
    pub truncate: usize,
    /// Let columns grow to fit their values.
    pub dynamic_widths: bool,
    pub refresh: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            truncate: DEFAULT_TRUNCATE,
            dynamic_widths: false,
            refresh: Duration::from_secs(1),
        }
    }
}

/// Where OS metrics come from.
pub enum OsSource {
    /// `/proc` of this machine.
    Local(Box<dyn ProcReader + Send>),
    /// `/proc` of the database host, through the helper schema.
    Remote { available: bool },
}

impl OsSource {
    pub fn remote() -> Self {
        OsSource::Remote { available: true }
    }
}

/// OS-wide part of a [`Stat`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SysStat {
    pub cpu: CpuUsage,
    pub mem: MemUsage,
    pub load: LoadAvg,
    /// Seconds since boot.
    pub uptime: Option<f64>,
}

/// Device or interface table shown under the main result.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraTable {
    pub kind: ExtraStat,
    pub table: Snapshot,
    pub widths: ColumnWidths,
}

/// Everything one cycle produced, ready for display.
#[derive(Debug, Clone)]
pub struct Stat {
    pub view: String,
    pub sys: SysStat,
    /// Rates for the active view, sorted, filtered and aligned.
    pub result: Snapshot,
    pub widths: ColumnWidths,
    pub align: AlignStatus,
    pub order_key: usize,
    pub order_desc: bool,
    pub filtered: bool,
    pub extra: Option<ExtraTable>,
    pub refresh: Duration,
    pub collected_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy)]
struct Timestamp {
    uptime: Option<f64>,
    at: Instant,
}

impl Timestamp {
    /// Seconds between two readings, by OS uptime when both have it.
    ///
    /// The uptime interval is rounded to whole clock ticks so that float
    /// noise in the readings does not leak into integer rates.
    fn seconds_since(&self, earlier: &Timestamp, tick_rate: u64) -> f64 {
        if let (Some(now), Some(then)) = (self.uptime, earlier.uptime) {
            if tick_rate > 0 {
                let ticks = tick_rate as f64;
                let secs = ((now - then) * ticks).round() / ticks;
                if secs > 0.0 {
                    return secs;
                }
            }
        }
        self.at.duration_since(earlier.at).as_secs_f64()
    }
}

#[derive(Debug, Clone)]
struct Sample<T> {
    value: T,
    at: Timestamp,
}

/// Last cycle's output before sorting and filtering.
#[derive(Debug, Clone)]
struct Published {
    delta: Snapshot,
    sys: SysStat,
    extra: Option<(ExtraStat, Snapshot)>,
    collected_at: DateTime<Local>,
}

/// Samples a database and its host.
pub struct Collector<D: Database> {
    db: D,
    os: OsSource,
    tick_rate: u64,
    config: CollectorConfig,
    view: View,
    prev_os: Option<Sample<OsSample>>,
    prev_pg: Option<Sample<Snapshot>>,
    prev_dev: Option<Sample<Snapshot>>,
    extra_widths: ColumnWidths,
    last: Option<Published>,
}

impl<D: Database> Collector<D> {
    pub fn new(mut db: D, os: OsSource, view: View, mut config: CollectorConfig) -> Self {
        let tick_rate = match os {
            OsSource::Local(_) => CLK_TCK,
            OsSource::Remote { .. } => remote_tick_rate(&mut db),
        };
        if let Some(refresh) = view.refresh {
            config.refresh = refresh;
        }

        Self {
            db,
            os,
            tick_rate,
            config,
            view,
            prev_os: None,
            prev_pg: None,
            prev_dev: None,
            extra_widths: ColumnWidths::new(),
            last: None,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn refresh(&self) -> Duration {
        self.config.refresh
    }

    pub fn tick_rate(&self) -> u64 {
        self.tick_rate
    }

    /// Runs one full cycle.
    ///
    /// A failing view query is shown as an error result; only a lost
    /// connection is returned as an error.
    pub fn update(&mut self) -> Result<Stat, CollectError> {
        let started = Instant::now();

        let os = self.with_reader(read_os_sample)?;
        let at = Timestamp {
            uptime: os.uptime,
            at: Instant::now(),
        };
        let cpu = self
            .prev_os
            .as_ref()
            .map(|prev| CpuUsage::between(&prev.value.cpu, &os.cpu))
            .unwrap_or_default();
        let sys = SysStat {
            cpu,
            mem: MemUsage::from(&os.mem),
            load: os.load,
            uptime: os.uptime,
        };
        self.prev_os = Some(Sample { value: os, at });

        let current = match self.db.query(&self.view.query) {
            Ok(snapshot) => snapshot,
            Err(DbError::Query(msg)) => {
                warn!(view = %self.view.name, "query failed: {}", msg);
                let columns = self
                    .prev_pg
                    .as_ref()
                    .map(|p| p.value.columns().to_vec())
                    .unwrap_or_default();
                Snapshot::failed(columns, msg)
            }
            Err(e) => {
                error!(view = %self.view.name, "{}", e);
                return Err(CollectError::Connection(e.to_string()));
            }
        };

        let delta = roll(
            &mut self.prev_pg,
            current,
            at,
            self.view.diff,
            self.view.unique_key,
            self.tick_rate,
            &self.view.name,
        );
        let extra = self.sample_extra(at)?;

        debug!(
            view = %self.view.name,
            rows = delta.row_count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "update"
        );

        let published = Published {
            delta,
            sys,
            extra,
            collected_at: Local::now(),
        };
        let stat = self.present(&published);
        self.last = Some(published);
        Ok(stat)
    }

    /// Rebuilds the last [`Stat`] with the current order and filters.
    ///
    /// `None` until the first update after a view switch.
    pub fn republish(&mut self) -> Option<Stat> {
        let last = self.last.take()?;
        let stat = self.present(&last);
        self.last = Some(last);
        Some(stat)
    }

    /// Makes `view` active and drops every previous sample.
    pub fn switch_view(&mut self, view: View) {
        info!(view = %view.name, "switching view");
        if let Some(refresh) = view.refresh {
            self.config.refresh = refresh;
        }
        self.view = view;
        self.prev_os = None;
        self.prev_pg = None;
        self.prev_dev = None;
        self.extra_widths.clear();
        self.last = None;
    }

    pub fn set_refresh(&mut self, refresh: Duration) {
        info!(refresh_ms = refresh.as_millis() as u64, "refresh changed");
        self.config.refresh = refresh;
    }

    /// Selects the device table; the database samples are kept.
    pub fn set_extra(&mut self, extra: ExtraStat) {
        info!(extra = %extra, "extra stats changed");
        self.view.extra = extra;
        self.prev_dev = None;
        self.extra_widths.clear();
        if let Some(last) = self.last.as_mut() {
            last.extra = None;
        }
    }

    /// Sets the order key, clamped to the columns of the last result.
    pub fn set_order(&mut self, column: usize, descending: bool) {
        let count = self.result_columns();
        self.view.order_key = if count > 0 { column.min(count - 1) } else { column };
        self.view.order_desc = descending;
    }

    /// Filters a column of the last result; clearing never fails.
    pub fn set_filter(&mut self, column: usize, pattern: Option<&str>) -> Result<(), ViewError> {
        let count = self.result_columns();
        let clearing = pattern.is_none_or(str::is_empty);
        if count > 0 && column >= count && !clearing {
            return Err(ViewError::Column { column, count });
        }
        self.view.set_filter(column, pattern)
    }

    fn result_columns(&self) -> usize {
        self.last.as_ref().map_or(0, |l| l.delta.column_count())
    }

    pub fn clear_filters(&mut self) {
        self.view.clear_filters();
    }

    fn present(&mut self, published: &Published) -> Stat {
        let mut result = published.delta.clone();

        let columns = result.column_count();
        if columns > 0 && self.view.order_key >= columns {
            self.view.order_key = columns - 1;
        }
        sort(&mut result, self.view.order_key, self.view.order_desc);

        let filtered = !self.view.filters.is_empty();
        if filtered {
            let view = &self.view;
            result.retain_rows(|row| view.matches(row));
        }

        let status = align(
            &mut result,
            &mut self.view.widths,
            self.config.truncate,
            self.config.dynamic_widths,
        );

        let extra = published.extra.as_ref().map(|(kind, table)| {
            let mut table = table.clone();
            sort(&mut table, 0, false);
            align(&mut table, &mut self.extra_widths, 0, true);
            ExtraTable {
                kind: *kind,
                table,
                widths: self.extra_widths.clone(),
            }
        });

        Stat {
            view: self.view.name.clone(),
            sys: published.sys.clone(),
            result,
            widths: self.view.widths.clone(),
            align: status,
            order_key: self.view.order_key,
            order_desc: self.view.order_desc,
            filtered,
            extra,
            refresh: self.config.refresh,
            collected_at: published.collected_at,
        }
    }

    fn sample_extra(
        &mut self,
        at: Timestamp,
    ) -> Result<Option<(ExtraStat, Snapshot)>, CollectError> {
        let kind = self.view.extra;
        let (file, range, build): (ProcFile, DiffRange, fn(&str) -> Snapshot) = match kind {
            ExtraStat::None => return Ok(None),
            ExtraStat::Diskstats => (ProcFile::Diskstats, DISKSTATS_DIFF, diskstats_snapshot),
            ExtraStat::Netdev => (ProcFile::NetDev, NETDEV_DIFF, netdev_snapshot),
        };

        let current = match self.with_reader(|reader| reader.read_proc(file))? {
            Some(text) => build(&text),
            None => Snapshot::failed(Vec::new(), format!("{} is not available", file.path())),
        };
        let rates = roll(
            &mut self.prev_dev,
            current,
            at,
            Some(range),
            0,
            self.tick_rate,
            file.name(),
        );
        Ok(Some((kind, rates)))
    }

    fn with_reader<R>(
        &mut self,
        read: impl FnOnce(&mut dyn ProcReader) -> R,
    ) -> Result<R, CollectError> {
        match &mut self.os {
            OsSource::Local(reader) => Ok(read(reader.as_mut())),
            OsSource::Remote { available } => {
                let mut reader = RemoteProc::new(&mut self.db, available);
                let value = read(&mut reader);
                match reader.connection_error {
                    Some(e) => Err(CollectError::Connection(e.to_string())),
                    None => Ok(value),
                }
            }
        }
    }
}

/// Differences `current` against the stored previous sample and, when that
/// worked, makes `current` the new previous sample.
///
/// Failed samples are shown but never stored, so the next good sample is
/// compared with the last good one over the longer interval.
fn roll(
    previous: &mut Option<Sample<Snapshot>>,
    current: Snapshot,
    at: Timestamp,
    range: Option<DiffRange>,
    key_column: usize,
    tick_rate: u64,
    label: &str,
) -> Snapshot {
    if current.error().is_some() {
        return current;
    }

    let delta = match previous.as_ref() {
        None => current.clone(),
        Some(prev) => {
            let elapsed = at.seconds_since(&prev.at, tick_rate);
            match diff(&current, &prev.value, elapsed, range, key_column) {
                Ok(delta) => delta,
                Err(e) => {
                    warn!(view = %label, "cannot compute rates: {}", e);
                    return Snapshot::failed(current.columns().to_vec(), e.to_string());
                }
            }
        }
    };

    *previous = Some(Sample { value: current, at });
    delta
}

fn remote_tick_rate<D: Database>(db: &mut D) -> u64 {
    match db.query(CLOCK_TICKS_QUERY) {
        Ok(result) => result
            .cell(0, 0)
            .and_then(|v| v.parse().ok())
            .filter(|&ticks| ticks > 0)
            .unwrap_or(CLK_TCK),
        Err(e) => {
            debug!("remote clock ticks unavailable, assuming {}: {}", CLK_TCK, e);
            CLK_TCK
        }
    }
}
