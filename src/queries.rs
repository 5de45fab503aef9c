use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::error::{Error, Result};
use crate::models::{AggregateView, Kpis, MapPoint, MonthlyCount, RoadTypeCount, Severity};

/// The year/severity filter shared by every read operation. An absent value
/// means "all".
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionFilter {
    pub year: Option<i32>,
    pub severity: Option<Severity>,
}

impl CollisionFilter {
    /// Renders the WHERE clause for this filter. `extra` conditions are
    /// emitted first and carry no bind parameters; filter parameters number
    /// from `$1` in bind order (year, then severity).
    fn where_clause(&self, extra: &[&str]) -> String {
        let mut conditions: Vec<String> = extra.iter().map(|c| (*c).to_string()).collect();
        let mut param = 1;
        if self.year.is_some() {
            conditions.push(format!("accident_year = ${param}"));
            param += 1;
        }
        if self.severity.is_some() {
            conditions.push(format!("severity = ${param}"));
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    /// The placeholder number available for a query's own trailing binds.
    fn next_param(&self) -> usize {
        1 + usize::from(self.year.is_some()) + usize::from(self.severity.is_some())
    }
}

fn count_sql(filter: &CollisionFilter) -> String {
    format!("SELECT COUNT(*) FROM collisions{}", filter.where_clause(&[]))
}

fn avg_sql(column: &str, filter: &CollisionFilter) -> String {
    format!(
        "SELECT COALESCE(AVG({column}), 0)::DOUBLE PRECISION FROM collisions{}",
        filter.where_clause(&[])
    )
}

fn trend_sql(filter: &CollisionFilter) -> String {
    format!(
        "SELECT DATE_TRUNC('month', accident_date)::DATE AS month, COUNT(*) AS cnt \
         FROM collisions{} GROUP BY month ORDER BY month",
        filter.where_clause(&[])
    )
}

fn roads_sql(filter: &CollisionFilter) -> String {
    format!(
        "SELECT road_type, COUNT(*) AS cnt FROM collisions{} \
         GROUP BY road_type ORDER BY cnt DESC, road_type ASC LIMIT ${}",
        filter.where_clause(&["road_type IS NOT NULL"]),
        filter.next_param()
    )
}

fn points_sql(filter: &CollisionFilter) -> String {
    // ORDER BY RANDOM() keeps the sample uniform over the matching set;
    // plain LIMIT would bias the map toward insertion order.
    format!(
        "SELECT latitude, longitude, severity FROM collisions{} \
         ORDER BY RANDOM() LIMIT ${}",
        filter.where_clause(&["latitude IS NOT NULL", "longitude IS NOT NULL"]),
        filter.next_param()
    )
}

pub async fn total_count(pool: &PgPool, filter: &CollisionFilter) -> Result<i64> {
    let sql = count_sql(filter);
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(year) = filter.year {
        query = query.bind(year);
    }
    if let Some(severity) = filter.severity {
        query = query.bind(severity.as_str());
    }
    Ok(query.fetch_one(pool).await?)
}

pub async fn average_casualties(pool: &PgPool, filter: &CollisionFilter) -> Result<f64> {
    fetch_average(pool, filter, "number_of_casualties").await
}

pub async fn average_vehicles(pool: &PgPool, filter: &CollisionFilter) -> Result<f64> {
    fetch_average(pool, filter, "number_of_vehicles").await
}

async fn fetch_average(pool: &PgPool, filter: &CollisionFilter, column: &str) -> Result<f64> {
    let sql = avg_sql(column, filter);
    let mut query = sqlx::query_scalar::<_, f64>(&sql);
    if let Some(year) = filter.year {
        query = query.bind(year);
    }
    if let Some(severity) = filter.severity {
        query = query.bind(severity.as_str());
    }
    Ok(query.fetch_one(pool).await?)
}

/// Collision counts bucketed by calendar month, in chronological order.
/// Only months present in the filtered set appear.
pub async fn monthly_trend(pool: &PgPool, filter: &CollisionFilter) -> Result<Vec<MonthlyCount>> {
    let sql = trend_sql(filter);
    let mut query = sqlx::query(&sql);
    if let Some(year) = filter.year {
        query = query.bind(year);
    }
    if let Some(severity) = filter.severity {
        query = query.bind(severity.as_str());
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| MonthlyCount {
            month: row.get::<NaiveDate, _>("month"),
            count: row.get("cnt"),
        })
        .collect())
}

/// The most common road types, ordered by count descending with ties broken
/// alphabetically, truncated to `limit` entries.
pub async fn top_road_types(
    pool: &PgPool,
    filter: &CollisionFilter,
    limit: i64,
) -> Result<Vec<RoadTypeCount>> {
    let sql = roads_sql(filter);
    let mut query = sqlx::query(&sql);
    if let Some(year) = filter.year {
        query = query.bind(year);
    }
    if let Some(severity) = filter.severity {
        query = query.bind(severity.as_str());
    }
    query = query.bind(limit.max(0));

    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| RoadTypeCount {
            road_type: row.get("road_type"),
            count: row.get("cnt"),
        })
        .collect())
}

/// A uniform-random sample of geotagged collisions, at most `max_points`
/// long. Repeated calls over the same data return different samples.
pub async fn sampled_locations(
    pool: &PgPool,
    filter: &CollisionFilter,
    max_points: i64,
) -> Result<Vec<MapPoint>> {
    let sql = points_sql(filter);
    let mut query = sqlx::query(&sql);
    if let Some(year) = filter.year {
        query = query.bind(year);
    }
    if let Some(severity) = filter.severity {
        query = query.bind(severity.as_str());
    }
    query = query.bind(max_points.max(0));

    let rows = query.fetch_all(pool).await?;
    rows.iter()
        .map(|row| {
            let label: String = row.get("severity");
            let severity = Severity::parse(&label).ok_or_else(|| Error::Conversion {
                message: format!("unknown severity label: {label}"),
            })?;
            Ok(MapPoint {
                latitude: row.get("latitude"),
                longitude: row.get("longitude"),
                severity,
            })
        })
        .collect()
}

/// Computes the full dashboard view for one filter combination. Every call
/// recomputes from the warehouse; nothing is cached.
pub async fn aggregate_view(
    pool: &PgPool,
    filter: &CollisionFilter,
    road_type_limit: i64,
    max_points: i64,
) -> Result<AggregateView> {
    let kpis = Kpis {
        total: total_count(pool, filter).await?,
        avg_casualties: average_casualties(pool, filter).await?,
        avg_vehicles: average_vehicles(pool, filter).await?,
    };
    Ok(AggregateView {
        kpis,
        monthly: monthly_trend(pool, filter).await?,
        road_types: top_road_types(pool, filter, road_type_limit).await?,
        points: sampled_locations(pool, filter, max_points).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(year: Option<i32>, severity: Option<Severity>) -> CollisionFilter {
        CollisionFilter { year, severity }
    }

    #[test]
    fn empty_filter_has_no_where_clause() {
        assert_eq!(filter(None, None).where_clause(&[]), "");
        assert_eq!(filter(None, None).next_param(), 1);
    }

    #[test]
    fn year_filter_binds_first() {
        let f = filter(Some(2020), None);
        assert_eq!(f.where_clause(&[]), " WHERE accident_year = $1");
        assert_eq!(f.next_param(), 2);
    }

    #[test]
    fn severity_numbering_follows_year() {
        let f = filter(Some(2020), Some(Severity::Fatal));
        assert_eq!(
            f.where_clause(&[]),
            " WHERE accident_year = $1 AND severity = $2"
        );
        assert_eq!(f.next_param(), 3);

        let severity_only = filter(None, Some(Severity::Fatal));
        assert_eq!(severity_only.where_clause(&[]), " WHERE severity = $1");
        assert_eq!(severity_only.next_param(), 2);
    }

    #[test]
    fn extra_conditions_come_before_filter_params() {
        let f = filter(None, Some(Severity::Slight));
        assert_eq!(
            f.where_clause(&["latitude IS NOT NULL", "longitude IS NOT NULL"]),
            " WHERE latitude IS NOT NULL AND longitude IS NOT NULL AND severity = $1"
        );
    }

    #[test]
    fn count_sql_with_no_filter_scans_the_table() {
        assert_eq!(
            count_sql(&filter(None, None)),
            "SELECT COUNT(*) FROM collisions"
        );
    }

    #[test]
    fn avg_sql_is_zero_on_empty_and_returns_a_float() {
        let sql = avg_sql("number_of_casualties", &filter(Some(2020), None));
        assert!(sql.contains("COALESCE(AVG(number_of_casualties), 0)::DOUBLE PRECISION"));
        assert!(sql.contains("WHERE accident_year = $1"));
    }

    #[test]
    fn trend_sql_orders_chronologically() {
        let sql = trend_sql(&filter(Some(2020), None));
        assert!(sql.contains("DATE_TRUNC('month', accident_date)"));
        assert!(sql.ends_with("GROUP BY month ORDER BY month"));
    }

    #[test]
    fn roads_sql_breaks_ties_alphabetically() {
        let sql = roads_sql(&filter(None, None));
        assert!(sql.contains("road_type IS NOT NULL"));
        assert!(sql.contains("ORDER BY cnt DESC, road_type ASC"));
        assert!(sql.ends_with("LIMIT $1"));
    }

    #[test]
    fn roads_limit_numbering_accounts_for_filters() {
        let sql = roads_sql(&filter(Some(2020), Some(Severity::Serious)));
        assert!(sql.contains("accident_year = $1"));
        assert!(sql.contains("severity = $2"));
        assert!(sql.ends_with("LIMIT $3"));
    }

    #[test]
    fn points_sql_samples_uniformly() {
        let sql = points_sql(&filter(None, None));
        assert!(sql.contains("latitude IS NOT NULL AND longitude IS NOT NULL"));
        assert!(sql.contains("ORDER BY RANDOM()"));
        assert!(sql.ends_with("LIMIT $1"));
    }
}
