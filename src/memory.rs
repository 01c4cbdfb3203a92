use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::WriteOp;
use crate::models::{
    Appointment, AppointmentScope, AppointmentStatus, Cursor, GeoPoint, GuestLog, Incident,
    IncidentFilter, IncidentScope, IncidentStatus, NewAppointment, NewIncident, Role, SosAlert,
    UserProfile,
};
use crate::store::{Collection, Store, WellnessOutcome};

#[derive(Default)]
struct Documents {
    users: HashMap<String, UserProfile>,
    incidents: HashMap<Uuid, Incident>,
    appointments: HashMap<Uuid, Appointment>,
    sos_alerts: Vec<SosAlert>,
    guest_logs: Vec<GuestLog>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Documents {
    /// Server clock that never repeats, so ordering in tests is deterministic.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

pub struct MemoryStore {
    docs: Mutex<Documents>,
    denied: Mutex<HashSet<Collection>>,
    changes: broadcast::Sender<Collection>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            docs: Mutex::new(Documents::default()),
            denied: Mutex::new(HashSet::new()),
            changes,
        }
    }

    pub fn deny_writes(&self, collection: Collection) {
        self.denied.lock().unwrap().insert(collection);
    }

    pub fn allow_writes(&self, collection: Collection) {
        self.denied.lock().unwrap().remove(&collection);
    }

    pub fn appointment_count(&self) -> usize {
        self.docs.lock().unwrap().appointments.len()
    }

    pub fn incident_count(&self) -> usize {
        self.docs.lock().unwrap().incidents.len()
    }

    fn guard(
        &self,
        collection: Collection,
        id: impl std::fmt::Display,
        op: WriteOp,
    ) -> AppResult<()> {
        if self.denied.lock().unwrap().contains(&collection) {
            return Err(AppError::denied(collection.doc_path(id), op));
        }
        Ok(())
    }

    fn announce(&self, collection: Collection) {
        let _ = self.changes.send(collection);
    }

    fn build_appointment(docs: &mut Documents, new: &NewAppointment, id: Uuid) -> Appointment {
        Appointment {
            id,
            student_id: new.student_id.clone(),
            student_name: new.student_name.clone(),
            staff_id: new.staff_id.clone(),
            staff_name: new.staff_name.clone(),
            appointment_type: new.appointment_type,
            scheduled_at: docs.stamp(),
            notes: new.notes.clone(),
            status: AppointmentStatus::Pending,
        }
    }
}

fn newest_first(incidents: &mut [Incident]) {
    incidents.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
}

#[async_trait]
impl Store for MemoryStore {
    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }

    async fn insert_user(&self, profile: &UserProfile) -> AppResult<()> {
        self.guard(Collection::Users, &profile.uid, WriteOp::Create)?;
        {
            let mut docs = self.docs.lock().unwrap();
            let duplicate = docs
                .users
                .values()
                .any(|u| u.uid == profile.uid || u.email == profile.email);
            if duplicate {
                return Err(AppError::validation(
                    "email",
                    "An account with this email or ID already exists.",
                ));
            }
            docs.users.insert(profile.uid.clone(), profile.clone());
        }
        self.announce(Collection::Users);
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> AppResult<Option<UserProfile>> {
        Ok(self.docs.lock().unwrap().users.get(uid).cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> AppResult<Vec<UserProfile>> {
        let mut users: Vec<UserProfile> = self
            .docs
            .lock()
            .unwrap()
            .users
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn update_role(&self, uid: &str, role: Role) -> AppResult<bool> {
        self.guard(Collection::Users, uid, WriteOp::Update)?;
        let found = match self.docs.lock().unwrap().users.get_mut(uid) {
            Some(user) => {
                user.role = role;
                true
            }
            None => false,
        };
        self.announce(Collection::Users);
        Ok(found)
    }

    async fn update_availability(&self, uid: &str, availability: &str) -> AppResult<bool> {
        self.guard(Collection::Users, uid, WriteOp::Update)?;
        let found = match self.docs.lock().unwrap().users.get_mut(uid) {
            Some(user) => {
                user.availability = Some(availability.to_string());
                true
            }
            None => false,
        };
        self.announce(Collection::Users);
        Ok(found)
    }

    async fn add_child(&self, parent_uid: &str, child_uid: &str) -> AppResult<bool> {
        self.guard(Collection::Users, parent_uid, WriteOp::Update)?;
        let found = match self.docs.lock().unwrap().users.get_mut(parent_uid) {
            Some(parent) => {
                if !parent.children_uids.iter().any(|c| c == child_uid) {
                    parent.children_uids.push(child_uid.to_string());
                }
                true
            }
            None => false,
        };
        self.announce(Collection::Users);
        Ok(found)
    }

    async fn delete_user(&self, uid: &str) -> AppResult<bool> {
        self.guard(Collection::Users, uid, WriteOp::Delete)?;
        let removed = self.docs.lock().unwrap().users.remove(uid).is_some();
        self.announce(Collection::Users);
        Ok(removed)
    }

    async fn insert_incident(&self, new: &NewIncident) -> AppResult<Incident> {
        let id = Uuid::new_v4();
        self.guard(Collection::Incidents, id, WriteOp::Create)?;
        let incident = {
            let mut docs = self.docs.lock().unwrap();
            let incident = Incident {
                id,
                created_at: docs.stamp(),
                incident_type: new.incident_type,
                transcript: new.transcript.clone(),
                location: new.location,
                status: IncidentStatus::Reported,
                reporter_id: new.reporter_id.clone(),
                reporter_name: new.reporter_name.clone(),
                target_student_id: new.target_student_id.clone(),
                target_student_name: new.target_student_name.clone(),
                voice_recording_url: new.voice_recording_url.clone(),
                media_urls: new.media_urls.clone(),
            };
            docs.incidents.insert(id, incident.clone());
            incident
        };
        self.announce(Collection::Incidents);
        Ok(incident)
    }

    async fn get_incident(&self, id: Uuid) -> AppResult<Option<Incident>> {
        Ok(self.docs.lock().unwrap().incidents.get(&id).cloned())
    }

    async fn update_incident_status(&self, id: Uuid, status: IncidentStatus) -> AppResult<bool> {
        self.guard(Collection::Incidents, id, WriteOp::Update)?;
        let found = match self.docs.lock().unwrap().incidents.get_mut(&id) {
            Some(incident) => {
                incident.status = status;
                true
            }
            None => false,
        };
        self.announce(Collection::Incidents);
        Ok(found)
    }

    async fn delete_incident(&self, id: Uuid) -> AppResult<bool> {
        self.guard(Collection::Incidents, id, WriteOp::Delete)?;
        let removed = self.docs.lock().unwrap().incidents.remove(&id).is_some();
        self.announce(Collection::Incidents);
        Ok(removed)
    }

    async fn query_incidents(&self, scope: &IncidentScope) -> AppResult<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self
            .docs
            .lock()
            .unwrap()
            .incidents
            .values()
            .filter(|i| scope.matches(i))
            .cloned()
            .collect();
        newest_first(&mut incidents);
        Ok(incidents)
    }

    async fn fetch_incident_page(
        &self,
        filter: &IncidentFilter,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> AppResult<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self
            .docs
            .lock()
            .unwrap()
            .incidents
            .values()
            .filter(|i| filter.matches(i))
            .filter(|i| cursor.map_or(true, |c| c.precedes(i)))
            .cloned()
            .collect();
        newest_first(&mut incidents);
        incidents.truncate(limit);
        Ok(incidents)
    }

    async fn assign_wellness(
        &self,
        incident_id: Uuid,
        appointment: &NewAppointment,
    ) -> AppResult<WellnessOutcome> {
        let appointment_id = Uuid::new_v4();
        self.guard(Collection::Appointments, appointment_id, WriteOp::Create)?;
        self.guard(Collection::Incidents, incident_id, WriteOp::Update)?;

        let outcome = {
            let mut docs = self.docs.lock().unwrap();
            match docs.incidents.get(&incident_id).map(|i| i.status) {
                None => WellnessOutcome::IncidentMissing,
                Some(IncidentStatus::WellnessAssigned) => WellnessOutcome::AlreadyAssigned,
                Some(_) => {
                    let created = Self::build_appointment(&mut docs, appointment, appointment_id);
                    docs.appointments.insert(appointment_id, created.clone());
                    if let Some(incident) = docs.incidents.get_mut(&incident_id) {
                        incident.status = IncidentStatus::WellnessAssigned;
                    }
                    WellnessOutcome::Assigned(created)
                }
            }
        };

        if matches!(outcome, WellnessOutcome::Assigned(_)) {
            self.announce(Collection::Appointments);
            self.announce(Collection::Incidents);
        }
        Ok(outcome)
    }

    async fn insert_appointment(&self, new: &NewAppointment) -> AppResult<Appointment> {
        let id = Uuid::new_v4();
        self.guard(Collection::Appointments, id, WriteOp::Create)?;
        let created = {
            let mut docs = self.docs.lock().unwrap();
            let created = Self::build_appointment(&mut docs, new, id);
            docs.appointments.insert(id, created.clone());
            created
        };
        self.announce(Collection::Appointments);
        Ok(created)
    }

    async fn get_appointment(&self, id: Uuid) -> AppResult<Option<Appointment>> {
        Ok(self.docs.lock().unwrap().appointments.get(&id).cloned())
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> AppResult<bool> {
        self.guard(Collection::Appointments, id, WriteOp::Update)?;
        let found = match self.docs.lock().unwrap().appointments.get_mut(&id) {
            Some(appointment) => {
                appointment.status = status;
                true
            }
            None => false,
        };
        self.announce(Collection::Appointments);
        Ok(found)
    }

    async fn query_appointments(&self, scope: &AppointmentScope) -> AppResult<Vec<Appointment>> {
        let mut appointments: Vec<Appointment> = self
            .docs
            .lock()
            .unwrap()
            .appointments
            .values()
            .filter(|a| scope.matches(a))
            .cloned()
            .collect();
        appointments.sort_by(|a, b| (a.scheduled_at, a.id).cmp(&(b.scheduled_at, b.id)));
        Ok(appointments)
    }

    async fn insert_sos(
        &self,
        uid: &str,
        user_name: &str,
        coords: GeoPoint,
    ) -> AppResult<SosAlert> {
        let id = Uuid::new_v4();
        self.guard(Collection::SosAlerts, id, WriteOp::Create)?;
        let alert = {
            let mut docs = self.docs.lock().unwrap();
            let alert = SosAlert {
                id,
                uid: uid.to_string(),
                user_name: user_name.to_string(),
                coords,
                raised_at: docs.stamp(),
                active: true,
            };
            docs.sos_alerts.push(alert.clone());
            alert
        };
        self.announce(Collection::SosAlerts);
        Ok(alert)
    }

    async fn active_sos(&self) -> AppResult<Vec<SosAlert>> {
        let mut alerts: Vec<SosAlert> = self
            .docs
            .lock()
            .unwrap()
            .sos_alerts
            .iter()
            .filter(|a| a.active)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.raised_at.cmp(&a.raised_at));
        Ok(alerts)
    }

    async fn insert_guest_log(&self, name: &str, purpose: &str) -> AppResult<GuestLog> {
        let id = Uuid::new_v4();
        self.guard(Collection::GuestLogs, id, WriteOp::Create)?;
        let log = {
            let mut docs = self.docs.lock().unwrap();
            let log = GuestLog {
                id,
                name: name.to_string(),
                purpose: purpose.to_string(),
                checked_in_at: docs.stamp(),
            };
            docs.guest_logs.push(log.clone());
            log
        };
        self.announce(Collection::GuestLogs);
        Ok(log)
    }
}
