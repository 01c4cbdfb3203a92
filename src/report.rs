use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{GeoPoint, Incident, IncidentStatus, IncidentType, SosAlert};
use crate::trends;

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSummary {
    pub incident_type: IncidentType,
    pub count: usize,
    pub open: usize,
}

/// One marker on the incidents map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub id: String,
    pub incident_type: IncidentType,
    pub status: IncidentStatus,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

pub fn summarize_by_type(incidents: &[Incident]) -> Vec<TypeSummary> {
    let mut map: HashMap<IncidentType, (usize, usize)> = HashMap::new();

    for incident in incidents {
        let entry = map.entry(incident.incident_type).or_insert((0, 0));
        entry.0 += 1;
        if is_open(incident.status) {
            entry.1 += 1;
        }
    }

    let mut summaries: Vec<TypeSummary> = map
        .into_iter()
        .map(|(incident_type, (count, open))| TypeSummary {
            incident_type,
            count,
            open,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.incident_type.as_str().cmp(b.incident_type.as_str()))
    });
    summaries
}

pub fn count_by_status(incidents: &[Incident]) -> Vec<(IncidentStatus, usize)> {
    IncidentStatus::ALL
        .iter()
        .map(|status| {
            let count = incidents.iter().filter(|i| i.status == *status).count();
            (*status, count)
        })
        .collect()
}

/// Incidents with a known position. Reports stored at (0, 0) are left off the map.
pub fn map_points(incidents: &[Incident]) -> Vec<MapPoint> {
    incidents
        .iter()
        .filter(|incident| !incident.location.is_unknown())
        .map(|incident| MapPoint {
            id: incident.id.to_string(),
            incident_type: incident.incident_type,
            status: incident.status,
            location: incident.location,
            created_at: incident.created_at,
        })
        .collect()
}

fn is_open(status: IncidentStatus) -> bool {
    matches!(status, IncidentStatus::Reported | IncidentStatus::InProgress)
}

/// Markdown overview for administrators.
pub fn build_report(
    since_days: i64,
    now: DateTime<Utc>,
    incidents: &[Incident],
    active_sos: &[SosAlert],
) -> String {
    let cutoff = trends::cutoff(since_days, now);
    let window: Vec<Incident> = incidents
        .iter()
        .filter(|incident| incident.created_at >= cutoff)
        .cloned()
        .collect();
    let summaries = summarize_by_type(&window);
    let scores = trends::score_students(&window, since_days, now);

    let mut output = String::new();

    let _ = writeln!(output, "# Campus Safety Overview");
    let _ = writeln!(
        output,
        "Incidents since {} ({} in window, {} total)",
        cutoff.format("%Y-%m-%d"),
        window.len(),
        incidents.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status");
    for (status, count) in count_by_status(&window) {
        let _ = writeln!(output, "- {status}: {count}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Incident Mix");
    if summaries.is_empty() {
        let _ = writeln!(output, "No incidents recorded for this window.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} incidents ({} open)",
                summary.incident_type, summary.count, summary.open
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Most Affected");
    if scores.is_empty() {
        let _ = writeln!(output, "No students named in this window.");
    } else {
        for score in scores.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}) score {:.2} across {} incidents",
                score.student_name, score.student_id, score.score, score.incident_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Active SOS Alerts");
    if active_sos.is_empty() {
        let _ = writeln!(output, "None.");
    } else {
        for alert in active_sos {
            let _ = writeln!(
                output,
                "- {} at ({:.4}, {:.4}) raised {}",
                alert.user_name,
                alert.coords.latitude,
                alert.coords.longitude,
                alert.raised_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    let mut recent = window;
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Reports");
    if recent.is_empty() {
        let _ = writeln!(output, "No incidents recorded for this window.");
    } else {
        for incident in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}) by {} on {}: {}",
                incident.incident_type,
                incident.status,
                incident.reporter_name,
                incident.created_at.format("%Y-%m-%d"),
                incident.transcript
            );
        }
    }

    output
}
