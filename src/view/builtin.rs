//! Views shipped with the monitor.
//!
//! Column positions matter: diff ranges, unique keys and default order keys
//! below refer to them. Float counters inside a diff range are rounded to two
//! decimals so that both samples render with the same precision.

use std::time::Duration;

use super::View;

pub(super) fn views(v: i32) -> Vec<View> {
    vec![
        View::new("activity", build_activity_query(v))
            .with_order(8, true)
            .with_hotkey('a'),
        View::new("databases", DATABASES_QUERY)
            .with_diff(2, 16)
            .with_order(2, true)
            .with_hotkey('d'),
        View::new("replication", build_replication_query(v))
            .with_order(11, true)
            .with_hotkey('r'),
        View::new("tables", TABLES_QUERY)
            .with_diff(1, 8)
            .with_order(1, true)
            .with_hotkey('t'),
        View::new("indexes", INDEXES_QUERY)
            .with_diff(1, 5)
            .with_order(1, true)
            .with_hotkey('i'),
        View::new("functions", FUNCTIONS_QUERY)
            .with_diff(3, 5)
            .with_order(3, true)
            .with_hotkey('f'),
        View::new("sizes", SIZES_QUERY)
            .with_diff(4, 6)
            .with_order(4, true)
            .with_refresh(Duration::from_secs(5))
            .with_hotkey('z'),
        View::new("statements", build_statements_query(v))
            .with_unique_key(2)
            .with_diff(3, 11)
            .with_order(5, true)
            .with_hotkey('s'),
        View::new("vacuum", build_vacuum_query(v))
            .with_unique_key(0)
            .with_diff(6, 7)
            .with_order(5, true)
            .with_hotkey('v'),
    ]
}

fn build_activity_query(v: i32) -> String {
    let (wait_type, wait_event) = if v >= 90600 {
        ("wait_event_type", "wait_event")
    } else {
        ("CASE WHEN waiting THEN 'waiting' END", "NULL::text")
    };

    format!(
        r#"
            SELECT
                pid,
                COALESCE(host(client_addr), 'local') AS client,
                usename AS user,
                datname AS database,
                state,
                {wait_type} AS wait_etype,
                {wait_event} AS wait_event,
                round(extract(epoch FROM clock_timestamp() - xact_start)::numeric, 1) AS xact_age,
                round(extract(epoch FROM clock_timestamp() - query_start)::numeric, 1) AS query_age,
                round(extract(epoch FROM clock_timestamp() - state_change)::numeric, 1) AS change_age,
                regexp_replace(query, '\s+', ' ', 'g') AS query
            FROM pg_stat_activity
            WHERE pid <> pg_backend_pid() AND datname IS NOT NULL
        "#
    )
}

const DATABASES_QUERY: &str = r#"
    SELECT
        datname AS database,
        numbackends AS backends,
        xact_commit AS commits,
        xact_rollback AS rollbacks,
        blks_read AS reads,
        blks_hit AS hits,
        tup_returned AS returned,
        tup_fetched AS fetched,
        tup_inserted AS inserts,
        tup_updated AS updates,
        tup_deleted AS deletes,
        conflicts,
        deadlocks,
        temp_files,
        temp_bytes,
        round(blk_read_time::numeric, 2) AS read_ms,
        round(blk_write_time::numeric, 2) AS write_ms,
        date_trunc('seconds', now() - stats_reset)::text AS stats_age
    FROM pg_stat_database
    WHERE datname IS NOT NULL
"#;

fn build_replication_query(v: i32) -> String {
    let (current, sent, write, flush, replay, lsn_diff) = if v >= 100000 {
        (
            "pg_current_wal_lsn()",
            "sent_lsn",
            "write_lsn",
            "flush_lsn",
            "replay_lsn",
            "pg_wal_lsn_diff",
        )
    } else {
        (
            "pg_current_xlog_location()",
            "sent_location",
            "write_location",
            "flush_location",
            "replay_location",
            "pg_xlog_location_diff",
        )
    };

    format!(
        r#"
            SELECT
                pid,
                COALESCE(host(client_addr), 'local') AS client,
                usename AS user,
                application_name AS name,
                state,
                sync_state AS mode,
                {current}::text AS wal,
                {sent}::text AS sent,
                {write}::text AS write,
                {flush}::text AS flush,
                {replay}::text AS replay,
                {lsn_diff}({current}, {replay}) AS replay_lag_bytes
            FROM pg_stat_replication
        "#
    )
}

const TABLES_QUERY: &str = r#"
    SELECT
        schemaname || '.' || relname AS relation,
        seq_scan,
        seq_tup_read,
        COALESCE(idx_scan, 0) AS idx_scan,
        COALESCE(idx_tup_fetch, 0) AS idx_tup_fetch,
        n_tup_ins AS inserts,
        n_tup_upd AS updates,
        n_tup_del AS deletes,
        n_tup_hot_upd AS hot_updates,
        n_live_tup AS live,
        n_dead_tup AS dead
    FROM pg_stat_user_tables
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        s.schemaname || '.' || s.indexrelname AS index,
        s.idx_scan,
        s.idx_tup_read,
        s.idx_tup_fetch,
        io.idx_blks_read,
        io.idx_blks_hit,
        s.relname AS relation
    FROM pg_stat_user_indexes s
    JOIN pg_statio_user_indexes io USING (indexrelid)
"#;

const FUNCTIONS_QUERY: &str = r#"
    SELECT
        funcid,
        schemaname AS schema,
        funcname AS function,
        calls,
        round(total_time::numeric, 2) AS total_ms,
        round(self_time::numeric, 2) AS self_ms,
        round((total_time / NULLIF(calls, 0))::numeric, 2) AS avg_ms
    FROM pg_stat_user_functions
"#;

const SIZES_QUERY: &str = r#"
    SELECT
        s.schemaname || '.' || s.relname AS relation,
        pg_size_pretty(pg_total_relation_size(s.relid)) AS total_size,
        pg_size_pretty(pg_relation_size(s.relid)) AS rel_size,
        pg_size_pretty(pg_indexes_size(s.relid)) AS idx_size,
        pg_total_relation_size(s.relid) AS total_change,
        pg_relation_size(s.relid) AS rel_change,
        pg_indexes_size(s.relid) AS idx_change
    FROM pg_stat_user_tables s
"#;

fn build_statements_query(v: i32) -> String {
    let total_time = if v >= 130000 {
        "s.total_exec_time"
    } else {
        "s.total_time"
    };

    format!(
        r#"
            SELECT
                COALESCE(r.rolname, '') AS user,
                COALESCE(d.datname, '') AS database,
                s.queryid,
                s.calls,
                s.rows,
                round({total_time}::numeric, 2) AS total_ms,
                s.shared_blks_hit AS hits,
                s.shared_blks_read AS reads,
                s.shared_blks_dirtied AS dirtied,
                s.shared_blks_written AS written,
                s.temp_blks_read AS temp_reads,
                s.temp_blks_written AS temp_writes,
                regexp_replace(s.query, '\s+', ' ', 'g') AS query
            FROM pg_stat_statements s
            LEFT JOIN pg_roles r ON r.oid = s.userid
            LEFT JOIN pg_database d ON d.oid = s.dbid
        "#
    )
}

fn build_vacuum_query(v: i32) -> String {
    // Dead tuple counters were replaced by TID store sizes in 17.
    let dead = if v >= 170000 {
        "p.num_dead_item_ids"
    } else {
        "p.num_dead_tuples"
    };

    format!(
        r#"
            SELECT
                p.pid,
                a.datname AS database,
                p.relid::regclass::text AS relation,
                p.phase,
                p.heap_blks_total AS total,
                round(100.0 * p.heap_blks_scanned / NULLIF(p.heap_blks_total, 0), 1) AS scanned_pct,
                p.heap_blks_scanned AS scanned,
                p.heap_blks_vacuumed AS vacuumed,
                p.index_vacuum_count AS index_passes,
                {dead} AS dead,
                round(extract(epoch FROM clock_timestamp() - a.xact_start)::numeric, 1) AS age
            FROM pg_stat_progress_vacuum p
            LEFT JOIN pg_stat_activity a USING (pid)
        "#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_use_exec_time_on_13_and_later() {
        assert!(build_statements_query(130000).contains("s.total_exec_time"));
        assert!(build_statements_query(120011).contains("s.total_time"));
        assert!(!build_statements_query(120011).contains("total_exec_time"));
    }

    #[test]
    fn replication_uses_xlog_names_before_10() {
        let old = build_replication_query(90624);
        assert!(old.contains("sent_location"));
        assert!(old.contains("pg_xlog_location_diff"));

        let new = build_replication_query(160002);
        assert!(new.contains("sent_lsn"));
        assert!(new.contains("pg_wal_lsn_diff"));
    }

    #[test]
    fn activity_falls_back_to_waiting_flag() {
        assert!(build_activity_query(90500).contains("waiting"));
        assert!(build_activity_query(160000).contains("wait_event_type"));
    }

    #[test]
    fn order_key_lies_within_selected_columns() {
        // Counts top-level select items by splitting on " AS " aliases.
        for view in views(160000) {
            let aliases = view
                .query
                .lines()
                .filter(|l| {
                    let l = l.trim();
                    !l.is_empty()
                        && !l.starts_with("SELECT")
                        && !l.starts_with("FROM")
                        && !l.starts_with("WHERE")
                        && !l.starts_with("JOIN")
                        && !l.starts_with("LEFT JOIN")
                })
                .count();
            assert!(view.order_key < aliases, "{}", view.name);
            if let Some(range) = view.diff {
                assert!(range.last() < aliases, "{}", view.name);
                assert!(view.unique_key < range.first(), "{}", view.name);
            }
        }
    }
}
