use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Incident, IncidentType};

/// Weighted incident pressure on one student, as shown under Behavioral Trends.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentTrend {
    pub student_id: String,
    pub student_name: String,
    pub score: f64,
    pub incident_count: usize,
}

/// Scores every targeted student over the window, highest first.
pub fn score_students(
    incidents: &[Incident],
    since_days: i64,
    now: DateTime<Utc>,
) -> Vec<StudentTrend> {
    let cutoff = cutoff(since_days, now);
    let mut scores: HashMap<&str, StudentTrend> = HashMap::new();

    for incident in incidents {
        if incident.created_at < cutoff {
            continue;
        }
        let Some(student_id) = incident.target_student_id.as_deref() else {
            continue;
        };

        let days_ago = (now - incident.created_at).num_days();
        let entry = scores.entry(student_id).or_insert_with(|| StudentTrend {
            student_id: student_id.to_string(),
            student_name: incident
                .target_student_name
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
            score: 0.0,
            incident_count: 0,
        });

        entry.score += severity(incident.incident_type) * recency_weight(days_ago);
        entry.incident_count += 1;
    }

    let mut values: Vec<StudentTrend> = scores.into_values().collect();
    values.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
    values
}

pub fn severity(incident_type: IncidentType) -> f64 {
    match incident_type {
        IncidentType::Intimidation => 3.0,
        IncidentType::VerbalAbuse => 2.5,
        IncidentType::MicroAggressions => 1.5,
        IncidentType::Other => 1.0,
    }
}

pub fn recency_weight(days_ago: i64) -> f64 {
    match days_ago {
        i64::MIN..=7 => 1.0,
        8..=30 => 0.7,
        31..=60 => 0.4,
        _ => 0.2,
    }
}

pub fn cutoff(since_days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(since_days.max(1))
}
