use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::{ErrorBus, WriteOp};
use crate::incidents::WELLNESS_STAFF_ID;
use crate::live::LiveQuery;
use crate::models::{
    Appointment, AppointmentScope, AppointmentStatus, AppointmentType, NewAppointment, Role,
    UserProfile,
};
use crate::store::{Collection, Store};
use crate::users::require_role;

const MIN_NOTES_LEN: usize = 10;
const MIN_AVAILABILITY_LEN: usize = 10;

pub struct AppointmentManager {
    store: Arc<dyn Store>,
    bus: ErrorBus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaffAgenda {
    pub pending: Vec<Appointment>,
    pub upcoming: Vec<Appointment>,
    pub other: Vec<Appointment>,
}

impl StaffAgenda {
    pub fn from_appointments(appointments: Vec<Appointment>) -> Self {
        let mut agenda = StaffAgenda::default();
        for appointment in appointments {
            match appointment.status {
                AppointmentStatus::Pending => agenda.pending.push(appointment),
                AppointmentStatus::Approved => agenda.upcoming.push(appointment),
                _ => agenda.other.push(appointment),
            }
        }
        agenda
    }
}

impl AppointmentManager {
    pub fn new(store: Arc<dyn Store>, bus: ErrorBus) -> Self {
        Self { store, bus }
    }

    pub async fn book(
        &self,
        student: &UserProfile,
        staff_id: &str,
        appointment_type: AppointmentType,
        notes: &str,
    ) -> AppResult<Appointment> {
        if appointment_type == AppointmentType::WellnessSession {
            return Err(AppError::validation(
                "type",
                "Wellness sessions are assigned by administrators.",
            ));
        }
        if notes.trim().chars().count() < MIN_NOTES_LEN {
            return Err(AppError::validation(
                "notes",
                "Please provide a brief reason for your appointment (min. 10 characters).",
            ));
        }

        let staff = self
            .store
            .get_user(staff_id)
            .await?
            .filter(|profile| profile.role == Role::Faculty)
            .ok_or_else(|| AppError::not_found("faculty", staff_id))?;

        let new = NewAppointment {
            student_id: student.uid.clone(),
            student_name: student.name.clone(),
            staff_id: staff.uid,
            staff_name: staff.name,
            appointment_type,
            notes: notes.trim().to_string(),
        };
        let created = self.store.insert_appointment(&new).await.map_err(|err| {
            self.bus.report(
                err,
                Collection::Appointments.as_str(),
                WriteOp::Create,
                Some(&new),
            )
        })?;
        info!(appointment = %created.id, staff = %created.staff_id, "session requested");
        Ok(created)
    }

    pub async fn approve(&self, actor: &UserProfile, id: Uuid) -> AppResult<Appointment> {
        self.transition(actor, id, AppointmentStatus::Approved).await
    }

    /// Marks a pending request for rescheduling. Picking the new time happens outside this system.
    pub async fn reschedule(&self, actor: &UserProfile, id: Uuid) -> AppResult<Appointment> {
        self.transition(actor, id, AppointmentStatus::Rescheduled).await
    }

    pub async fn complete(&self, actor: &UserProfile, id: Uuid) -> AppResult<Appointment> {
        self.transition(actor, id, AppointmentStatus::Completed).await
    }

    /// Only the staff member the appointment is addressed to may move it. Wellness
    /// department sessions are moved by administrators.
    async fn transition(
        &self,
        actor: &UserProfile,
        id: Uuid,
        next: AppointmentStatus,
    ) -> AppResult<Appointment> {
        let path = Collection::Appointments.doc_path(id);
        let payload = serde_json::json!({ "status": next });

        let mut appointment = self
            .store
            .get_appointment(id)
            .await?
            .ok_or_else(|| AppError::not_found("appointment", id.to_string()))?;

        let owns = appointment.staff_id == actor.uid
            || (appointment.staff_id == WELLNESS_STAFF_ID && actor.role == Role::Admin);
        if !owns {
            let err = AppError::denied(path.clone(), WriteOp::Update);
            return Err(self.bus.report(err, path, WriteOp::Update, Some(&payload)));
        }
        if !appointment.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: appointment.status,
                to: next,
            });
        }

        let updated = self
            .store
            .update_appointment_status(id, next)
            .await
            .map_err(|err| self.bus.report(err, path.clone(), WriteOp::Update, Some(&payload)))?;
        if !updated {
            return Err(AppError::not_found("appointment", id.to_string()));
        }

        info!(appointment = %id, status = %next, "appointment updated");
        appointment.status = next;
        Ok(appointment)
    }

    pub async fn set_availability(&self, staff: &UserProfile, availability: &str) -> AppResult<()> {
        let availability = availability.trim();
        if availability.chars().count() < MIN_AVAILABILITY_LEN {
            return Err(AppError::validation(
                "availability",
                "Please describe your availability (min. 10 characters).",
            ));
        }
        let path = Collection::Users.doc_path(&staff.uid);
        let payload = serde_json::json!({ "availability": availability });
        let result = match require_role(staff, Role::Faculty, path.clone(), WriteOp::Update) {
            Ok(()) => self.store.update_availability(&staff.uid, availability).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(true) => {
                info!(staff = %staff.uid, "availability updated");
                Ok(())
            }
            Ok(false) => Err(AppError::not_found("user", staff.uid.clone())),
            Err(err) => Err(self.bus.report(err, path, WriteOp::Update, Some(&payload))),
        }
    }

    pub async fn faculty(&self) -> AppResult<Vec<UserProfile>> {
        self.store.list_users(Some(Role::Faculty)).await
    }

    pub async fn list(&self, scope: &AppointmentScope) -> AppResult<Vec<Appointment>> {
        self.store.query_appointments(scope).await
    }

    pub async fn agenda(&self, staff_id: &str) -> AppResult<StaffAgenda> {
        let appointments = self
            .list(&AppointmentScope::ForStaff(staff_id.to_string()))
            .await?;
        Ok(StaffAgenda::from_appointments(appointments))
    }

    pub fn subscribe(&self, scope: AppointmentScope) -> LiveQuery<Appointment> {
        let store = self.store.clone();
        LiveQuery::spawn(Collection::Appointments, self.store.changes(), move || {
            let store = store.clone();
            let scope = scope.clone();
            async move { store.query_appointments(&scope).await }
        })
    }
}
