use std::fmt::Write;

use crate::models::AggregateView;
use crate::queries::CollisionFilter;

/// Human-readable description of the active filters, for report headings.
pub fn filter_label(filter: &CollisionFilter) -> String {
    let year = filter
        .year
        .map_or_else(|| "all years".to_string(), |y| y.to_string());
    let severity = filter
        .severity
        .map_or_else(|| "all severities".to_string(), |s| s.to_string());
    format!("{year}, {severity}")
}

/// Renders the dashboard view as a markdown summary.
pub fn build_report(filter: &CollisionFilter, view: &AggregateView) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# UK Road Collision Summary");
    let _ = writeln!(output, "Scope: {}", filter_label(filter));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Figures");
    let _ = writeln!(output, "- Collisions: {}", view.kpis.total);
    let _ = writeln!(
        output,
        "- Average casualties: {:.2}",
        view.kpis.avg_casualties
    );
    let _ = writeln!(output, "- Average vehicles: {:.2}", view.kpis.avg_vehicles);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Trend");
    if view.monthly.is_empty() {
        let _ = writeln!(output, "No matching collisions.");
    } else {
        for entry in &view.monthly {
            let _ = writeln!(
                output,
                "- {}: {} collisions",
                entry.month.format("%Y-%m"),
                entry.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Road Types");
    if view.road_types.is_empty() {
        let _ = writeln!(output, "No matching collisions.");
    } else {
        for entry in &view.road_types {
            let _ = writeln!(output, "- {}: {}", entry.road_type, entry.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Map Sample");
    if view.points.is_empty() {
        let _ = writeln!(output, "No geotagged collisions in scope.");
    } else {
        let _ = writeln!(
            output,
            "{} randomly sampled collision locations.",
            view.points.len()
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Kpis, MapPoint, MonthlyCount, RoadTypeCount, Severity};
    use chrono::NaiveDate;

    fn sample_view() -> AggregateView {
        AggregateView {
            kpis: Kpis {
                total: 5,
                avg_casualties: 1.6,
                avg_vehicles: 2.0,
            },
            monthly: vec![
                MonthlyCount {
                    month: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                    count: 2,
                },
                MonthlyCount {
                    month: NaiveDate::from_ymd_opt(2020, 6, 1).unwrap(),
                    count: 3,
                },
            ],
            road_types: vec![
                RoadTypeCount {
                    road_type: "Single carriageway".to_string(),
                    count: 4,
                },
                RoadTypeCount {
                    road_type: "Roundabout".to_string(),
                    count: 1,
                },
            ],
            points: vec![MapPoint {
                latitude: 51.5,
                longitude: -0.12,
                severity: Severity::Fatal,
            }],
        }
    }

    #[test]
    fn report_renders_all_sections() {
        let filter = CollisionFilter {
            year: Some(2020),
            severity: Some(Severity::Fatal),
        };
        let report = build_report(&filter, &sample_view());

        assert!(report.contains("# UK Road Collision Summary"));
        assert!(report.contains("Scope: 2020, Fatal"));
        assert!(report.contains("- Collisions: 5"));
        assert!(report.contains("- Average casualties: 1.60"));
        assert!(report.contains("- 2020-01: 2 collisions"));
        assert!(report.contains("- Single carriageway: 4"));
        assert!(report.contains("1 randomly sampled collision locations."));
    }

    #[test]
    fn monthly_entries_keep_chronological_order() {
        let report = build_report(&CollisionFilter::default(), &sample_view());
        let january = report.find("2020-01").unwrap();
        let june = report.find("2020-06").unwrap();
        assert!(january < june);
    }

    #[test]
    fn empty_view_renders_placeholders_not_errors() {
        let report = build_report(&CollisionFilter::default(), &AggregateView::default());
        assert!(report.contains("Scope: all years, all severities"));
        assert!(report.contains("- Collisions: 0"));
        assert!(report.contains("- Average casualties: 0.00"));
        assert!(report.contains("No matching collisions."));
        assert!(report.contains("No geotagged collisions in scope."));
    }
}
