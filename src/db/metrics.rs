//! Read-only reporting queries over the metrics schema. Rows are
//! bulk-loaded by an external ETL; this layer only reads and counts.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use super::DbError;

/// Latest-period summary per institution: balance aggregates plus the key
/// profitability and portfolio-quality ratios.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MetricaResumen {
    pub institucion: String,
    pub fecha_corte: NaiveDate,
    pub activos_totales: Option<Decimal>,
    pub cartera_total: Option<Decimal>,
    pub roa: Option<Decimal>,
    pub roe: Option<Decimal>,
    pub imor: Option<Decimal>,
    pub icor: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SegmentoCalidad {
    pub institucion: String,
    pub segmento: String,
    pub fecha_corte: NaiveDate,
    pub cartera_total: Option<Decimal>,
    pub cartera_vencida: Option<Decimal>,
    pub imor: Option<Decimal>,
    pub icor: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

const COUNTED_TABLES: &[&str] = &[
    "instituciones",
    "metricas_financieras",
    "segmentos_cartera",
    "metricas_cartera_segmentada",
];

/// Row counts for every table in the schema, the post-condition check
/// after loads and restores.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<TableCount>, DbError> {
    let mut counts = Vec::with_capacity(COUNTED_TABLES.len());
    for table in COUNTED_TABLES {
        // Table names come from the fixed list above, never from input.
        let query = format!("SELECT COUNT(*) FROM {table}");
        let (rows,): (i64,) = sqlx::query_as(&query).fetch_one(pool).await?;
        counts.push(TableCount {
            table: table.to_string(),
            rows,
        });
    }
    Ok(counts)
}

/// Latest metrics per institution, optionally pinned to one institution
/// (matched against either name) and/or an exact cutoff date.
pub async fn latest_report(
    pool: &PgPool,
    institucion: Option<&str>,
    fecha: Option<NaiveDate>,
) -> Result<Vec<MetricaResumen>, DbError> {
    let rows = sqlx::query_as::<_, MetricaResumen>(
        "SELECT DISTINCT ON (m.institucion_id)
                i.nombre_corto AS institucion,
                m.fecha_corte,
                m.activos_totales,
                m.cartera_total,
                m.roa,
                m.roe,
                m.imor,
                m.icor
         FROM metricas_financieras m
         JOIN instituciones i ON i.id = m.institucion_id
         WHERE ($1::text IS NULL OR i.nombre_corto = $1 OR i.nombre_oficial = $1)
           AND ($2::date IS NULL OR m.fecha_corte = $2)
         ORDER BY m.institucion_id, m.fecha_corte DESC",
    )
    .bind(institucion)
    .bind(fecha)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Segment-level portfolio quality for one institution, latest period per
/// segment.
pub async fn segment_quality(
    pool: &PgPool,
    institucion: &str,
) -> Result<Vec<SegmentoCalidad>, DbError> {
    let rows = sqlx::query_as::<_, SegmentoCalidad>(
        "SELECT DISTINCT ON (s.segmento_id)
                i.nombre_corto AS institucion,
                seg.nombre AS segmento,
                s.fecha_corte,
                s.cartera_total,
                s.cartera_vencida,
                s.imor,
                s.icor
         FROM metricas_cartera_segmentada s
         JOIN instituciones i ON i.id = s.institucion_id
         JOIN segmentos_cartera seg ON seg.id = s.segmento_id
         WHERE i.nombre_corto = $1 OR i.nombre_oficial = $1
         ORDER BY s.segmento_id, s.fecha_corte DESC",
    )
    .bind(institucion)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
