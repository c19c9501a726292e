use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;

use pgharvest_core::{Metric, MetricRow};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Metric columns of each admin table, after `server_name` and before
/// `last_updated`.
pub fn metric_columns(metric: Metric) -> &'static [&'static str] {
    match metric {
        Metric::DatabaseSizes => &["database_name", "database_size_mb", "database_size_gb"],
        Metric::TableSizes => &[
            "database_name",
            "schema_name",
            "table_name",
            "table_size_bytes",
            "index_size_bytes",
            "total_size_bytes",
            "row_count",
        ],
        Metric::TableUsage => &[
            "database_name",
            "schema_name",
            "table_name",
            "sequential_scans",
            "sequential_tuple_scans",
            "index_scans",
            "index_tuple_fetches",
        ],
        Metric::IndexUsage => &[
            "database_name",
            "schema_name",
            "table_name",
            "index_name",
            "index_scans",
            "index_tuples_read",
            "index_tuples_fetched",
        ],
        Metric::Indexes => &[
            "database_name",
            "schema_name",
            "table_name",
            "index_name",
            "index_size_bytes",
            "index_definition",
        ],
        Metric::Grants => &[
            "database_name",
            "schema_name",
            "object_name",
            "object_type",
            "grantor",
            "grantee",
            "privilege_type",
            "is_grantable",
            "with_hierarchy",
        ],
        Metric::Users => &[
            "rolname",
            "rolsuper",
            "rolinherit",
            "rolcreaterole",
            "rolcreatedb",
            "rolcanlogin",
            "rolreplication",
            "rolconnlimit",
            "rolvaliduntil",
            "memberof",
            "rolconfig",
        ],
    }
}

/// Parameterized insert for `metric`; `schema` must already be validated.
pub fn insert_statement(schema: &str, metric: Metric) -> String {
    let columns = metric_columns(metric);
    let placeholders: Vec<String> = (1..=columns.len() + 1).map(|idx| format!("${idx}")).collect();
    format!(
        "insert into {schema}.{table} (server_name, {columns}, last_updated) values ({placeholders}, current_timestamp)",
        table = metric.sink_table(),
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
    )
}

/// Bind `server` and the row values in `metric_columns` order.
pub fn bind_row<'q>(query: PgQuery<'q>, server: &'q str, row: &'q MetricRow) -> PgQuery<'q> {
    let query = query.bind(server);
    match row {
        MetricRow::DatabaseSizes(row) => query
            .bind(&row.database)
            .bind(row.size_mb)
            .bind(row.size_gb),
        MetricRow::TableSizes(row) => query
            .bind(&row.database)
            .bind(&row.schema)
            .bind(&row.table)
            .bind(row.table_bytes)
            .bind(row.index_bytes)
            .bind(row.total_bytes)
            .bind(row.row_estimate),
        MetricRow::TableUsage(row) => query
            .bind(&row.database)
            .bind(&row.schema)
            .bind(&row.table)
            .bind(row.sequential_scans)
            .bind(row.sequential_tuples_read)
            .bind(row.index_scans)
            .bind(row.index_tuples_fetched),
        MetricRow::IndexUsage(row) => query
            .bind(&row.database)
            .bind(&row.schema)
            .bind(&row.table)
            .bind(&row.index)
            .bind(row.index_scans)
            .bind(row.tuples_read)
            .bind(row.tuples_fetched),
        MetricRow::Indexes(row) => query
            .bind(&row.database)
            .bind(&row.schema)
            .bind(&row.table)
            .bind(&row.index)
            .bind(row.size_bytes)
            .bind(&row.definition),
        MetricRow::Grants(row) => query
            .bind(&row.database)
            .bind(&row.schema)
            .bind(&row.object)
            .bind(row.object_type.as_deref())
            .bind(&row.grantor)
            .bind(&row.grantee)
            .bind(&row.privilege_type)
            .bind(row.is_grantable)
            .bind(row.with_hierarchy),
        MetricRow::Users(row) => query
            .bind(&row.name)
            .bind(row.superuser)
            .bind(row.inherit)
            .bind(row.create_role)
            .bind(row.create_db)
            .bind(row.can_login)
            .bind(row.replication)
            .bind(row.connection_limit)
            .bind(row.valid_until)
            .bind(&row.member_of)
            .bind(row.config.clone()),
    }
}
