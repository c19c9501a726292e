use pgharvest_core::{
    DatabaseSize, Grant, IndexDefinition, IndexUsage, MetricRow, Role, TableEntry, TableSize,
    TableUsage,
};

use super::queries::{
    RawDatabaseSize, RawGrant, RawIndex, RawIndexUsage, RawRole, RawTableEntry, RawTableSize,
    RawTableUsage,
};

pub fn map_database_sizes(raw: Vec<RawDatabaseSize>) -> Vec<MetricRow> {
    raw.into_iter()
        .map(|row| {
            MetricRow::DatabaseSizes(DatabaseSize {
                database: row.database,
                size_mb: row.size_mb,
                size_gb: row.size_gb,
            })
        })
        .collect()
}

pub fn map_table_sizes(raw: Vec<RawTableSize>) -> Vec<MetricRow> {
    raw.into_iter()
        .map(|row| {
            MetricRow::TableSizes(TableSize {
                database: row.database,
                schema: row.schema,
                table: row.table,
                table_bytes: row.table_bytes,
                index_bytes: row.index_bytes,
                total_bytes: row.total_bytes,
                row_estimate: row_estimate(row.reltuples),
            })
        })
        .collect()
}

pub fn map_table_usage(raw: Vec<RawTableUsage>) -> Vec<MetricRow> {
    raw.into_iter()
        .map(|row| {
            MetricRow::TableUsage(TableUsage {
                database: row.database,
                schema: row.schema,
                table: row.table,
                sequential_scans: row.seq_scan,
                sequential_tuples_read: row.seq_tup_read,
                index_scans: row.idx_scan,
                index_tuples_fetched: row.idx_tup_fetch,
            })
        })
        .collect()
}

pub fn map_index_usage(raw: Vec<RawIndexUsage>) -> Vec<MetricRow> {
    raw.into_iter()
        .map(|row| {
            MetricRow::IndexUsage(IndexUsage {
                database: row.database,
                schema: row.schema,
                table: row.table,
                index: row.index,
                index_scans: row.idx_scan,
                tuples_read: row.idx_tup_read,
                tuples_fetched: row.idx_tup_fetch,
            })
        })
        .collect()
}

pub fn map_indexes(raw: Vec<RawIndex>) -> Vec<MetricRow> {
    raw.into_iter()
        .map(|row| {
            MetricRow::Indexes(IndexDefinition {
                database: row.database,
                schema: row.schema,
                table: row.table,
                index: row.index,
                size_bytes: row.size_bytes,
                definition: row.definition,
            })
        })
        .collect()
}

pub fn map_grants(raw: Vec<RawGrant>) -> Vec<MetricRow> {
    raw.into_iter()
        .map(|row| {
            MetricRow::Grants(Grant {
                database: row.database,
                schema: row.schema,
                object: row.object,
                object_type: row.object_type.filter(|kind| !kind.is_empty()),
                grantor: row.grantor,
                grantee: row.grantee,
                privilege_type: row.privilege_type,
                is_grantable: yes_or_no(&row.is_grantable),
                with_hierarchy: row.with_hierarchy.as_deref().map(yes_or_no),
            })
        })
        .collect()
}

pub fn map_roles(raw: Vec<RawRole>) -> Vec<MetricRow> {
    raw.into_iter()
        .map(|row| {
            MetricRow::Users(Role {
                name: row.rolname,
                superuser: row.rolsuper,
                inherit: row.rolinherit,
                create_role: row.rolcreaterole,
                create_db: row.rolcreatedb,
                can_login: row.rolcanlogin,
                replication: row.rolreplication,
                connection_limit: row.rolconnlimit,
                valid_until: row.rolvaliduntil,
                member_of: row.memberof,
                config: row.rolconfig,
            })
        })
        .collect()
}

pub fn map_table_entries(raw: Vec<RawTableEntry>) -> Vec<TableEntry> {
    raw.into_iter()
        .map(|row| TableEntry {
            schema: row.schema,
            table: row.table,
        })
        .collect()
}

/// `reltuples` is -1 for tables that were never vacuumed or analyzed.
fn row_estimate(reltuples: f32) -> Option<i64> {
    if reltuples < 0.0 || !reltuples.is_finite() {
        None
    } else {
        Some(reltuples.round() as i64)
    }
}

/// information_schema encodes booleans as the `yes_or_no` domain.
fn yes_or_no(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("yes")
}
