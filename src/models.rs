use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownLabel {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

labelled_enum!(
    Role {
        Student => "student",
        Guard => "guard",
        Admin => "admin",
        Faculty => "faculty",
        Parent => "parent",
        Visitor => "visitor",
    }
);

labelled_enum!(
    IncidentType {
        VerbalAbuse => "Verbal Abuse",
        Intimidation => "Intimidation",
        MicroAggressions => "Micro-aggressions",
        Other => "Other",
    }
);

labelled_enum!(
    IncidentStatus {
        Reported => "reported",
        InProgress => "in-progress",
        Resolved => "resolved",
        WellnessAssigned => "wellness-assigned",
    }
);

labelled_enum!(
    AppointmentType {
        AcademicGuidance => "Academic Guidance",
        GrievanceRedressal => "Grievance Redressal",
        Mentorship => "Mentorship",
        WellnessSession => "Wellness Session",
    }
);

labelled_enum!(
    AppointmentStatus {
        Pending => "pending",
        Approved => "approved",
        Completed => "completed",
        Rescheduled => "rescheduled",
    }
);

impl AppointmentStatus {
    /// Staff-driven transitions. Everything else is rejected.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Pending, AppointmentStatus::Approved)
                | (AppointmentStatus::Pending, AppointmentStatus::Rescheduled)
                | (AppointmentStatus::Approved, AppointmentStatus::Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The placeholder stored when a device location was unavailable.
    pub fn is_unknown(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub language_preference: Option<String>,
    pub children_uids: Vec<String>,
    pub availability: Option<String>,
    pub mobile_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub incident_type: IncidentType,
    pub transcript: String,
    pub location: GeoPoint,
    pub status: IncidentStatus,
    pub reporter_id: String,
    pub reporter_name: String,
    pub target_student_id: Option<String>,
    pub target_student_name: Option<String>,
    pub voice_recording_url: Option<String>,
    pub media_urls: Vec<String>,
}

/// Incident fields fixed at submission. Names are snapshots and never refreshed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIncident {
    pub incident_type: IncidentType,
    pub transcript: String,
    pub location: GeoPoint,
    pub reporter_id: String,
    pub reporter_name: String,
    pub target_student_id: Option<String>,
    pub target_student_name: Option<String>,
    pub voice_recording_url: Option<String>,
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub staff_id: String,
    pub staff_name: String,
    pub appointment_type: AppointmentType,
    pub scheduled_at: DateTime<Utc>,
    pub notes: String,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAppointment {
    pub student_id: String,
    pub student_name: String,
    pub staff_id: String,
    pub staff_name: String,
    pub appointment_type: AppointmentType,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosAlert {
    pub id: Uuid,
    pub uid: String,
    pub user_name: String,
    pub coords: GeoPoint,
    pub raised_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestLog {
    pub id: Uuid,
    pub name: String,
    pub purpose: String,
    pub checked_in_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub incident_type: Option<IncidentType>,
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.status.map_or(true, |s| s == incident.status)
            && self
                .incident_type
                .map_or(true, |t| t == incident.incident_type)
    }
}

/// Position after the last document of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn after(incident: &Incident) -> Self {
        Self {
            created_at: incident.created_at,
            id: incident.id,
        }
    }

    /// True when `incident` sorts strictly after this cursor in `created_at DESC, id DESC` order.
    pub fn precedes(&self, incident: &Incident) -> bool {
        (incident.created_at, incident.id) < (self.created_at, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentScope {
    All,
    ReportedBy(String),
    Involving(String),
    TargetingAny(Vec<String>),
}

impl IncidentScope {
    pub fn matches(&self, incident: &Incident) -> bool {
        match self {
            IncidentScope::All => true,
            IncidentScope::ReportedBy(uid) => &incident.reporter_id == uid,
            IncidentScope::Involving(uid) => {
                &incident.reporter_id == uid
                    || incident.target_student_id.as_deref() == Some(uid.as_str())
            }
            IncidentScope::TargetingAny(uids) => incident
                .target_student_id
                .as_ref()
                .map_or(false, |target| uids.contains(target)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentScope {
    ForStudent(String),
    ForStaff(String),
}

impl AppointmentScope {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        match self {
            AppointmentScope::ForStudent(uid) => &appointment.student_id == uid,
            AppointmentScope::ForStaff(uid) => &appointment.staff_id == uid,
        }
    }
}
