use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Appointment, AppointmentScope, AppointmentStatus, Cursor, GeoPoint, GuestLog, Incident,
    IncidentFilter, IncidentScope, IncidentStatus, NewAppointment, NewIncident, Role, SosAlert,
    UserProfile,
};

/// Document collections. The string form is the document path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Incidents,
    Appointments,
    SosAlerts,
    GuestLogs,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Incidents => "incidents",
            Collection::Appointments => "appointments",
            Collection::SosAlerts => "sos_alerts",
            Collection::GuestLogs => "guestLogs",
        }
    }

    pub fn doc_path(&self, id: impl fmt::Display) -> String {
        format!("{}/{}", self.as_str(), id)
    }
}

impl FromStr for Collection {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "users" => Ok(Collection::Users),
            "incidents" => Ok(Collection::Incidents),
            "appointments" => Ok(Collection::Appointments),
            "sos_alerts" => Ok(Collection::SosAlerts),
            "guestLogs" => Ok(Collection::GuestLogs),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WellnessOutcome {
    Assigned(Appointment),
    AlreadyAssigned,
    IncidentMissing,
}

/// Source of truth for every collection. Successful writes are announced on `changes()`.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    fn changes(&self) -> broadcast::Receiver<Collection>;

    async fn insert_user(&self, profile: &UserProfile) -> AppResult<()>;
    async fn get_user(&self, uid: &str) -> AppResult<Option<UserProfile>>;
    async fn list_users(&self, role: Option<Role>) -> AppResult<Vec<UserProfile>>;
    async fn update_role(&self, uid: &str, role: Role) -> AppResult<bool>;
    async fn update_availability(&self, uid: &str, availability: &str) -> AppResult<bool>;
    async fn add_child(&self, parent_uid: &str, child_uid: &str) -> AppResult<bool>;
    async fn delete_user(&self, uid: &str) -> AppResult<bool>;

    async fn insert_incident(&self, incident: &NewIncident) -> AppResult<Incident>;
    async fn get_incident(&self, id: Uuid) -> AppResult<Option<Incident>>;
    async fn update_incident_status(&self, id: Uuid, status: IncidentStatus) -> AppResult<bool>;
    async fn delete_incident(&self, id: Uuid) -> AppResult<bool>;
    async fn query_incidents(&self, scope: &IncidentScope) -> AppResult<Vec<Incident>>;
    /// Up to `limit` incidents matching `filter`, newest first, strictly after `cursor`.
    async fn fetch_incident_page(
        &self,
        filter: &IncidentFilter,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> AppResult<Vec<Incident>>;
    /// Creates the wellness appointment and marks the incident in one atomic step.
    async fn assign_wellness(
        &self,
        incident_id: Uuid,
        appointment: &NewAppointment,
    ) -> AppResult<WellnessOutcome>;

    async fn insert_appointment(&self, appointment: &NewAppointment) -> AppResult<Appointment>;
    async fn get_appointment(&self, id: Uuid) -> AppResult<Option<Appointment>>;
    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> AppResult<bool>;
    async fn query_appointments(&self, scope: &AppointmentScope) -> AppResult<Vec<Appointment>>;

    async fn insert_sos(&self, uid: &str, user_name: &str, coords: GeoPoint)
        -> AppResult<SosAlert>;
    async fn active_sos(&self) -> AppResult<Vec<SosAlert>>;
    async fn insert_guest_log(&self, name: &str, purpose: &str) -> AppResult<GuestLog>;
}
