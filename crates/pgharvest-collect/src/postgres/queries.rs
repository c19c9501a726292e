use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use pgharvest_core::{Error, Result};

fn query_error(err: sqlx::Error) -> Error {
    Error::Query(err.to_string())
}

pub async fn list_databases(conn: &mut PgConnection) -> Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        select datname::text
        from pg_database
        where datistemplate = false
        order by datname
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawDatabaseSize {
    pub database: String,
    pub size_mb: i64,
    pub size_gb: i64,
}

pub async fn database_sizes(conn: &mut PgConnection) -> Result<Vec<RawDatabaseSize>> {
    sqlx::query_as::<_, RawDatabaseSize>(
        r#"
        select
          datname::text as database,
          pg_database_size(datname) / 1024 / 1024 as size_mb,
          pg_database_size(datname) / 1024 / 1024 / 1024 as size_gb
        from pg_database
        where datistemplate = false
        order by datname
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawTableSize {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub table_bytes: i64,
    pub index_bytes: i64,
    pub total_bytes: i64,
    pub reltuples: f32,
}

pub async fn table_sizes(conn: &mut PgConnection) -> Result<Vec<RawTableSize>> {
    sqlx::query_as::<_, RawTableSize>(
        r#"
        select
          current_database()::text as database,
          n.nspname::text as schema,
          c.relname::text as "table",
          pg_table_size(c.oid) as table_bytes,
          pg_indexes_size(c.oid) as index_bytes,
          pg_total_relation_size(c.oid) as total_bytes,
          c.reltuples as reltuples
        from pg_class c
        left join pg_namespace n on n.oid = c.relnamespace
        where n.nspname not in ('pg_catalog', 'information_schema')
          and c.relkind = 'r'
        order by pg_total_relation_size(c.oid) desc
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawTableUsage {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub seq_scan: Option<i64>,
    pub seq_tup_read: Option<i64>,
    pub idx_scan: Option<i64>,
    pub idx_tup_fetch: Option<i64>,
}

pub async fn table_usage(conn: &mut PgConnection) -> Result<Vec<RawTableUsage>> {
    sqlx::query_as::<_, RawTableUsage>(
        r#"
        select
          current_database()::text as database,
          schemaname::text as schema,
          relname::text as "table",
          seq_scan,
          seq_tup_read,
          idx_scan,
          idx_tup_fetch
        from pg_stat_user_tables
        order by schemaname, relname
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawIndexUsage {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub index: String,
    pub idx_scan: Option<i64>,
    pub idx_tup_read: Option<i64>,
    pub idx_tup_fetch: Option<i64>,
}

pub async fn index_usage(conn: &mut PgConnection) -> Result<Vec<RawIndexUsage>> {
    sqlx::query_as::<_, RawIndexUsage>(
        r#"
        select
          current_database()::text as database,
          i.schemaname::text as schema,
          i.relname::text as "table",
          i.indexrelname::text as index,
          i.idx_scan,
          i.idx_tup_read,
          i.idx_tup_fetch
        from pg_stat_user_indexes as i
        order by i.schemaname, i.relname, i.indexrelname
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawIndex {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub index: String,
    pub size_bytes: i64,
    pub definition: String,
}

pub async fn indexes(conn: &mut PgConnection) -> Result<Vec<RawIndex>> {
    sqlx::query_as::<_, RawIndex>(
        r#"
        select
          current_database()::text as database,
          n.nspname::text as schema,
          t.relname::text as "table",
          i.relname::text as index,
          pg_relation_size(i.oid) as size_bytes,
          left(pg_get_indexdef(i.oid), 255) as definition
        from pg_class t
        join pg_index x on t.oid = x.indrelid
        join pg_class i on i.oid = x.indexrelid
        join pg_namespace n on n.oid = t.relnamespace
        where t.relkind = 'r'
          and i.relkind = 'i'
          and n.nspname not in ('pg_catalog', 'information_schema')
        order by n.nspname, t.relname, i.relname
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawGrant {
    pub database: String,
    pub schema: String,
    pub object: String,
    pub object_type: Option<String>,
    pub grantor: String,
    pub grantee: String,
    pub privilege_type: String,
    pub is_grantable: String,
    pub with_hierarchy: Option<String>,
}

pub async fn grants(conn: &mut PgConnection) -> Result<Vec<RawGrant>> {
    sqlx::query_as::<_, RawGrant>(
        r#"
        with results as (
          select rug.grantor, rug.grantee, rug.object_catalog, rug.object_schema,
                 rug.object_name, rug.object_type, rug.privilege_type, rug.is_grantable,
                 null::text as with_hierarchy
          from information_schema.role_usage_grants rug
          where rug.object_schema not in ('pg_catalog', 'information_schema')
            and rug.grantor <> rug.grantee
          union
          select rtg.grantor, rtg.grantee, rtg.table_catalog, rtg.table_schema,
                 rtg.table_name, tab.table_type, rtg.privilege_type, rtg.is_grantable,
                 rtg.with_hierarchy
          from information_schema.role_table_grants rtg
          left join information_schema.tables tab
            on tab.table_catalog = rtg.table_catalog
           and tab.table_schema = rtg.table_schema
           and tab.table_name = rtg.table_name
          where rtg.table_schema not in ('pg_catalog', 'information_schema')
            and rtg.grantor <> rtg.grantee
          union
          select rrg.grantor, rrg.grantee, rrg.routine_catalog, rrg.routine_schema,
                 rrg.routine_name, fcn.routine_type, rrg.privilege_type, rrg.is_grantable,
                 null::text as with_hierarchy
          from information_schema.role_routine_grants rrg
          left join information_schema.routines fcn
            on fcn.routine_catalog = rrg.routine_catalog
           and fcn.routine_schema = rrg.routine_schema
           and fcn.routine_name = rrg.routine_name
          where rrg.specific_schema not in ('pg_catalog', 'information_schema')
            and rrg.grantor <> rrg.grantee
          union
          select rudt.grantor, rudt.grantee, rudt.udt_catalog, rudt.udt_schema,
                 rudt.udt_name, ''::text as udt_type, rudt.privilege_type, rudt.is_grantable,
                 null::text as with_hierarchy
          from information_schema.role_udt_grants rudt
          where rudt.udt_schema not in ('pg_catalog', 'information_schema')
            and substr(rudt.udt_schema, 1, 3) <> 'pg_'
            and rudt.grantor <> rudt.grantee
        )
        select
          object_catalog::text as database,
          object_schema::text as schema,
          object_name::text as object,
          object_type::text as object_type,
          grantor::text as grantor,
          grantee::text as grantee,
          privilege_type::text as privilege_type,
          is_grantable::text as is_grantable,
          with_hierarchy::text as with_hierarchy
        from results
        order by object_catalog, object_schema, object_name, object_type
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawRole {
    pub rolname: String,
    pub rolsuper: bool,
    pub rolinherit: bool,
    pub rolcreaterole: bool,
    pub rolcreatedb: bool,
    pub rolcanlogin: bool,
    pub rolreplication: bool,
    pub rolconnlimit: i32,
    pub rolvaliduntil: Option<DateTime<Utc>>,
    pub memberof: Vec<String>,
    pub rolconfig: Option<Vec<String>>,
}

pub async fn roles(conn: &mut PgConnection) -> Result<Vec<RawRole>> {
    sqlx::query_as::<_, RawRole>(
        r#"
        select
          r.rolname::text as rolname,
          r.rolsuper,
          r.rolinherit,
          r.rolcreaterole,
          r.rolcreatedb,
          r.rolcanlogin,
          r.rolreplication,
          r.rolconnlimit,
          case when isfinite(r.rolvaliduntil) then r.rolvaliduntil end as rolvaliduntil,
          array(
            select b.rolname::text
            from pg_catalog.pg_auth_members m
            join pg_catalog.pg_roles b on m.roleid = b.oid
            where m.member = r.oid
            order by b.rolname
          ) as memberof,
          r.rolconfig
        from pg_catalog.pg_roles r
        order by r.rolname
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawTableEntry {
    pub schema: String,
    pub table: String,
}

pub async fn base_tables(conn: &mut PgConnection) -> Result<Vec<RawTableEntry>> {
    sqlx::query_as::<_, RawTableEntry>(
        r#"
        select
          t.table_schema::text as schema,
          t.table_name::text as "table"
        from information_schema.tables as t
        where t.table_type = 'BASE TABLE'
          and t.table_schema not in ('pg_catalog', 'information_schema')
        order by t.table_schema, t.table_name
        "#,
    )
    .fetch_all(conn)
    .await
    .map_err(query_error)
}
