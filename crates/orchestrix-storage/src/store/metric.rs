use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{ConnectionTrait, DbBackend, DbErr, EntityTrait, QueryResult, Statement, Value};
use uuid::Uuid;

use orchestrix_common::metric::{MetricAggregate, MetricQuery, MetricSample, TimeBucket};
use orchestrix_common::{Error, Result};

use crate::entities::metric_sample;
use crate::store::{store_err, PgStore};
use crate::MetricStore;

const SAMPLE_COLUMNS: &str =
    r#"id, tenant_id, name, value, labels, source, "timestamp", created_at"#;

fn to_active_model(sample: &MetricSample) -> Result<metric_sample::ActiveModel> {
    let labels = serde_json::to_value(&sample.labels)
        .map_err(|e| Error::Internal(format!("serialize labels: {e}")))?;
    Ok(metric_sample::ActiveModel {
        id: Set(sample.id),
        tenant_id: Set(sample.tenant_id),
        name: Set(sample.name.clone()),
        value: Set(sample.value),
        labels: Set(labels),
        source: Set(sample.source.clone()),
        timestamp: Set(sample.timestamp.fixed_offset()),
        created_at: Set(sample.created_at.fixed_offset()),
    })
}

fn sample_from_row(row: &QueryResult) -> std::result::Result<MetricSample, DbErr> {
    let labels: serde_json::Value = row.try_get("", "labels")?;
    let timestamp: sea_orm::prelude::DateTimeWithTimeZone = row.try_get("", "timestamp")?;
    let created_at: sea_orm::prelude::DateTimeWithTimeZone = row.try_get("", "created_at")?;
    Ok(MetricSample {
        id: row.try_get("", "id")?,
        tenant_id: row.try_get("", "tenant_id")?,
        name: row.try_get("", "name")?,
        value: row.try_get("", "value")?,
        labels: serde_json::from_value(labels).unwrap_or_default(),
        source: row.try_get("", "source")?,
        timestamp: timestamp.with_timezone(&Utc),
        created_at: created_at.with_timezone(&Utc),
    })
}

/// Appends the shared WHERE conditions of a metric query and returns the
/// SQL fragment. Parameter indexes continue from `values.len()`.
fn push_query_filters(query: &MetricQuery, sql: &mut String, values: &mut Vec<Value>) -> Result<()> {
    if let Some(start) = query.start {
        values.push(start.fixed_offset().into());
        sql.push_str(&format!(r#" AND "timestamp" >= ${}"#, values.len()));
    }
    if let Some(end) = query.end {
        values.push(end.fixed_offset().into());
        sql.push_str(&format!(r#" AND "timestamp" <= ${}"#, values.len()));
    }
    if let Some(labels) = &query.labels {
        if !labels.is_empty() {
            let encoded = serde_json::to_string(labels)
                .map_err(|e| Error::Internal(format!("serialize label filter: {e}")))?;
            values.push(encoded.into());
            sql.push_str(&format!(" AND labels @> ${}::jsonb", values.len()));
        }
    }
    Ok(())
}

#[async_trait]
impl MetricStore for PgStore {
    async fn save(&self, sample: &MetricSample) -> Result<()> {
        metric_sample::Entity::insert(to_active_model(sample)?)
            .exec(self.db())
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn save_batch(&self, samples: &[MetricSample]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }
        let models = samples
            .iter()
            .map(to_active_model)
            .collect::<Result<Vec<_>>>()?;
        // A single multi-row INSERT: all samples commit or none do.
        metric_sample::Entity::insert_many(models)
            .exec(self.db())
            .await
            .map_err(store_err)?;
        Ok(samples.len())
    }

    async fn find_by_query(&self, query: &MetricQuery) -> Result<Vec<MetricSample>> {
        let mut sql = format!(
            "SELECT {SAMPLE_COLUMNS} FROM metric_samples WHERE tenant_id = $1 AND name = $2"
        );
        let mut values: Vec<Value> = vec![query.tenant_id.into(), query.name.clone().into()];
        push_query_filters(query, &mut sql, &mut values)?;

        sql.push_str(r#" ORDER BY "timestamp" DESC"#);
        values.push(query.effective_limit().into());
        sql.push_str(&format!(" LIMIT ${}", values.len()));
        values.push(query.offset.max(0).into());
        sql.push_str(&format!(" OFFSET ${}", values.len()));

        let rows = self
            .db()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                values,
            ))
            .await
            .map_err(store_err)?;
        rows.iter()
            .map(sample_from_row)
            .collect::<std::result::Result<Vec<_>, DbErr>>()
            .map_err(store_err)
    }

    async fn count_by_query(&self, query: &MetricQuery) -> Result<u64> {
        let mut sql = String::from(
            "SELECT COUNT(*) AS total FROM metric_samples WHERE tenant_id = $1 AND name = $2",
        );
        let mut values: Vec<Value> = vec![query.tenant_id.into(), query.name.clone().into()];
        push_query_filters(query, &mut sql, &mut values)?;

        let row = self
            .db()
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                values,
            ))
            .await
            .map_err(store_err)?
            .ok_or_else(|| Error::Internal("count query returned no row".into()))?;
        let total: i64 = row.try_get("", "total").map_err(store_err)?;
        Ok(total as u64)
    }

    async fn find_latest(
        &self,
        tenant_id: Uuid,
        name: &str,
        labels: Option<&HashMap<String, String>>,
    ) -> Result<MetricSample> {
        let mut sql = format!(
            "SELECT {SAMPLE_COLUMNS} FROM metric_samples WHERE tenant_id = $1 AND name = $2"
        );
        let mut values: Vec<Value> = vec![tenant_id.into(), name.to_string().into()];
        if let Some(labels) = labels {
            if !labels.is_empty() {
                let encoded = serde_json::to_string(labels)
                    .map_err(|e| Error::Internal(format!("serialize label filter: {e}")))?;
                values.push(encoded.into());
                sql.push_str(&format!(" AND labels @> ${}::jsonb", values.len()));
            }
        }
        sql.push_str(r#" ORDER BY "timestamp" DESC LIMIT 1"#);

        let row = self
            .db()
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                values,
            ))
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => sample_from_row(&row).map_err(store_err),
            None => Err(Error::NotFound("metric")),
        }
    }

    async fn get_aggregate(&self, query: &MetricQuery) -> Result<MetricAggregate> {
        let mut sql = String::from(
            "SELECT COUNT(*) AS count, \
                    COALESCE(AVG(value), 0) AS avg, \
                    COALESCE(MIN(value), 0) AS min, \
                    COALESCE(MAX(value), 0) AS max, \
                    COALESCE(SUM(value), 0) AS sum \
             FROM metric_samples WHERE tenant_id = $1 AND name = $2",
        );
        let mut values: Vec<Value> = vec![query.tenant_id.into(), query.name.clone().into()];
        push_query_filters(query, &mut sql, &mut values)?;

        let row = self
            .db()
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                values,
            ))
            .await
            .map_err(store_err)?
            .ok_or_else(|| Error::Internal("aggregate query returned no row".into()))?;

        // Percentiles stay unset: the store contract does not assume
        // percentile operators are available.
        Ok(MetricAggregate {
            count: row.try_get("", "count").map_err(store_err)?,
            avg: row.try_get("", "avg").map_err(store_err)?,
            min: row.try_get("", "min").map_err(store_err)?,
            max: row.try_get("", "max").map_err(store_err)?,
            sum: row.try_get("", "sum").map_err(store_err)?,
            p50: None,
            p95: None,
            p99: None,
        })
    }

    async fn get_series(&self, query: &MetricQuery, bucket: Duration) -> Result<Vec<TimeBucket>> {
        let bucket_secs = bucket.num_seconds().max(1) as f64;
        let mut sql = String::from(
            "SELECT to_timestamp(floor(extract(epoch FROM \"timestamp\") / $1) * $1) AS bucket_start, \
                    COUNT(*) AS count, AVG(value) AS avg, MIN(value) AS min, \
                    MAX(value) AS max, SUM(value) AS sum \
             FROM metric_samples WHERE tenant_id = $2 AND name = $3",
        );
        let mut values: Vec<Value> = vec![
            bucket_secs.into(),
            query.tenant_id.into(),
            query.name.clone().into(),
        ];
        push_query_filters(query, &mut sql, &mut values)?;
        sql.push_str(" GROUP BY bucket_start ORDER BY bucket_start DESC");

        let rows = self
            .db()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                values,
            ))
            .await
            .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                let bucket_start: sea_orm::prelude::DateTimeWithTimeZone =
                    row.try_get("", "bucket_start")?;
                Ok(TimeBucket {
                    bucket_start: bucket_start.with_timezone(&Utc),
                    count: row.try_get("", "count")?,
                    avg: row.try_get("", "avg")?,
                    min: row.try_get("", "min")?,
                    max: row.try_get("", "max")?,
                    sum: row.try_get("", "sum")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, DbErr>>()
            .map_err(store_err)
    }

    async fn list_names(&self, tenant_id: Uuid, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut sql =
            String::from("SELECT DISTINCT name FROM metric_samples WHERE tenant_id = $1");
        let mut values: Vec<Value> = vec![tenant_id.into()];
        if let Some(prefix) = prefix {
            if !prefix.is_empty() {
                values.push(format!("{prefix}%").into());
                sql.push_str(&format!(" AND name LIKE ${}", values.len()));
            }
        }
        sql.push_str(" ORDER BY name");

        let rows = self
            .db()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                values,
            ))
            .await
            .map_err(store_err)?;
        rows.iter()
            .map(|row| row.try_get("", "name").map_err(store_err))
            .collect()
    }
}
