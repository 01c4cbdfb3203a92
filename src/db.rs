use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::WriteOp;
use crate::models::{
    Appointment, AppointmentScope, AppointmentStatus, Cursor, GeoPoint, GuestLog, Incident,
    IncidentFilter, IncidentScope, IncidentStatus, NewAppointment, NewIncident, Role, SosAlert,
    UserProfile,
};
use crate::store::{Collection, Store, WellnessOutcome};

const CHANGE_CHANNEL: &str = "campus_changes";
const UNIQUE_VIOLATION: &str = "23505";
const ADMIN_SEED_UID: &str = "admin1";

const USER_COLUMNS: &str = "uid, name, email, role, department, language_preference, \
     children_uids, availability, mobile_number";
const INCIDENT_COLUMNS: &str = "id, created_at, incident_type, transcript, latitude, longitude, \
     status, reporter_id, reporter_name, target_student_id, target_student_name, \
     voice_recording_url, media_urls";
const APPOINTMENT_COLUMNS: &str = "id, student_id, student_name, staff_id, staff_name, \
     appointment_type, scheduled_at, notes, status";
const SOS_COLUMNS: &str = "id, uid, user_name, latitude, longitude, raised_at, active";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    set_actor(&mut tx, Some(ADMIN_SEED_UID)).await?;

    let users = vec![
        (ADMIN_SEED_UID, "Priya Raman", "priya.raman@hitam.org", "admin", None),
        ("guard1", "Ravi Teja", "ravi.teja@hitam.org", "guard", None),
        ("fac1", "Dr. Meera Iyer", "meera.iyer@hitam.org", "faculty", Some("Computer Science")),
        ("stud1", "A. Kumar", "a.kumar@hitam.org", "student", None),
        ("stud2", "Sana Shaikh", "sana.shaikh@hitam.org", "student", None),
        ("parent1", "Lakshmi Kumar", "lakshmi.kumar@hitam.org", "parent", None),
    ];

    for (uid, name, email, role, department) in users {
        sqlx::query(
            r#"
            INSERT INTO campus_guardian.users (uid, name, email, role, department, mobile_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (uid) DO UPDATE
            SET name = EXCLUDED.name, role = EXCLUDED.role, department = EXCLUDED.department
            "#,
        )
        .bind(uid)
        .bind(name)
        .bind(email)
        .bind(role)
        .bind(department)
        .bind("9876543210")
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "UPDATE campus_guardian.users SET children_uids = ARRAY['stud1'] WHERE uid = 'parent1'",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE campus_guardian.users SET availability = $1 WHERE uid = 'fac1'")
        .bind("Mondays and Wednesdays, 10 AM to 12 PM. Book a day ahead.")
        .execute(&mut *tx)
        .await?;

    let incidents = vec![
        (
            Uuid::parse_str("5b8f9a1e-7c2d-4f3a-9e6b-1a2b3c4d5e6f")?,
            "Intimidation",
            "He screamed at me and blocked my path near the library entrance",
            (17.2942, 78.4728),
            "reported",
            ("guard1", "Campus Security"),
            Some(("stud1", "A. Kumar")),
        ),
        (
            Uuid::parse_str("9d3e2c1b-4a5f-4e6d-8c7b-2f1e0d9c8b7a")?,
            "Verbal Abuse",
            "Repeated insults shouted across the cafeteria during lunch",
            (17.2951, 78.4735),
            "in-progress",
            ("guard1", "Campus Security"),
            None,
        ),
        (
            Uuid::parse_str("1f2e3d4c-5b6a-4978-8695-a4b3c2d1e0f9")?,
            "Micro-aggressions",
            "Classmates keep mocking my accent whenever I answer in seminars",
            (0.0, 0.0),
            "resolved",
            ("stud2", "Sana Shaikh"),
            Some(("stud1", "A. Kumar")),
        ),
    ];

    for (id, incident_type, transcript, (lat, lng), status, (reporter_id, reporter_name), target) in
        incidents
    {
        sqlx::query(
            r#"
            INSERT INTO campus_guardian.incidents
            (id, incident_type, transcript, latitude, longitude, status,
             reporter_id, reporter_name, target_student_id, target_student_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(incident_type)
        .bind(transcript)
        .bind(lat)
        .bind(lng)
        .bind(status)
        .bind(reporter_id)
        .bind(reporter_name)
        .bind(target.map(|(uid, _)| uid))
        .bind(target.map(|(_, name)| name))
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO campus_guardian.appointments
        (id, student_id, student_name, staff_id, staff_name, appointment_type, notes, status)
        VALUES ($1, 'stud2', 'Sana Shaikh', 'fac1', 'Dr. Meera Iyer', 'Academic Guidance', $2,
                'pending')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("c0ffee00-1234-4abc-9def-0123456789ab")?)
    .bind("Need help choosing electives for next semester")
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Binds the acting uid for the rest of the transaction. The access-rule triggers read it.
async fn set_actor(conn: &mut PgConnection, uid: Option<&str>) -> sqlx::Result<()> {
    sqlx::query("SELECT set_config('campus_guardian.actor', $1, true)")
        .bind(uid.unwrap_or_default())
        .execute(conn)
        .await?;
    Ok(())
}

/// Postgres-backed store for one signed-in session. Writes run as `actor`.
pub struct PgStore {
    pool: PgPool,
    actor: Option<String>,
    changes: broadcast::Sender<Collection>,
    listener: JoinHandle<()>,
}

impl PgStore {
    pub async fn connect(pool: PgPool, actor: Option<String>) -> anyhow::Result<Self> {
        let (changes, _) = broadcast::channel(128);
        let mut listener = PgListener::connect_with(&pool)
            .await
            .context("failed to open change listener connection")?;
        listener.listen(CHANGE_CHANNEL).await?;

        let sender = changes.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match notification.payload().parse::<Collection>() {
                        Ok(collection) => {
                            let _ = sender.send(collection);
                        }
                        Err(()) => {
                            warn!(payload = notification.payload(), "unknown change payload")
                        }
                    },
                    Err(err) => {
                        warn!("change listener error: {err}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        info!("listening for data changes on {CHANGE_CHANNEL}");
        Ok(Self {
            pool,
            actor,
            changes,
            listener: task,
        })
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        set_actor(&mut tx, self.actor.as_deref()).await?;
        Ok(tx)
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn user_from_row(row: &PgRow) -> AppResult<UserProfile> {
    Ok(UserProfile {
        uid: row.try_get("uid")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        department: row.try_get("department")?,
        language_preference: row.try_get("language_preference")?,
        children_uids: row.try_get("children_uids")?,
        availability: row.try_get("availability")?,
        mobile_number: row.try_get("mobile_number")?,
    })
}

fn incident_from_row(row: &PgRow) -> AppResult<Incident> {
    Ok(Incident {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        incident_type: row.try_get::<String, _>("incident_type")?.parse()?,
        transcript: row.try_get("transcript")?,
        location: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
        status: row.try_get::<String, _>("status")?.parse()?,
        reporter_id: row.try_get("reporter_id")?,
        reporter_name: row.try_get("reporter_name")?,
        target_student_id: row.try_get("target_student_id")?,
        target_student_name: row.try_get("target_student_name")?,
        voice_recording_url: row.try_get("voice_recording_url")?,
        media_urls: row.try_get("media_urls")?,
    })
}

fn appointment_from_row(row: &PgRow) -> AppResult<Appointment> {
    Ok(Appointment {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        student_name: row.try_get("student_name")?,
        staff_id: row.try_get("staff_id")?,
        staff_name: row.try_get("staff_name")?,
        appointment_type: row.try_get::<String, _>("appointment_type")?.parse()?,
        scheduled_at: row.try_get("scheduled_at")?,
        notes: row.try_get("notes")?,
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

fn sos_from_row(row: &PgRow) -> AppResult<SosAlert> {
    Ok(SosAlert {
        id: row.try_get("id")?,
        uid: row.try_get("uid")?,
        user_name: row.try_get("user_name")?,
        coords: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
        raised_at: row.try_get("raised_at")?,
        active: row.try_get("active")?,
    })
}

fn collect<T>(rows: &[PgRow], map: fn(&PgRow) -> AppResult<T>) -> AppResult<Vec<T>> {
    rows.iter().map(map).collect()
}

#[async_trait]
impl Store for PgStore {
    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }

    async fn insert_user(&self, profile: &UserProfile) -> AppResult<()> {
        let path = Collection::Users.doc_path(&profile.uid);
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO campus_guardian.users
            (uid, name, email, role, department, language_preference,
             children_uids, availability, mobile_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&profile.uid)
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(profile.role.as_str())
        .bind(&profile.department)
        .bind(&profile.language_preference)
        .bind(&profile.children_uids)
        .bind(&profile.availability)
        .bind(&profile.mobile_number)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            let duplicate = matches!(
                &err,
                sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
            );
            if duplicate {
                AppError::validation("email", "An account with this email or ID already exists.")
            } else {
                AppError::from_write(err, path, WriteOp::Create)
            }
        })?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM campus_guardian.users WHERE uid = $1"
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self, role: Option<Role>) -> AppResult<Vec<UserProfile>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {USER_COLUMNS} FROM campus_guardian.users"
        ));
        if let Some(role) = role {
            query.push(" WHERE role = ").push_bind(role.as_str());
        }
        query.push(" ORDER BY name");
        let rows = query.build().fetch_all(&self.pool).await?;
        collect(&rows, user_from_row)
    }

    async fn update_role(&self, uid: &str, role: Role) -> AppResult<bool> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("UPDATE campus_guardian.users SET role = $2 WHERE uid = $1")
            .bind(uid)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                AppError::from_write(err, Collection::Users.doc_path(uid), WriteOp::Update)
            })?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_availability(&self, uid: &str, availability: &str) -> AppResult<bool> {
        let mut tx = self.begin().await?;
        let result =
            sqlx::query("UPDATE campus_guardian.users SET availability = $2 WHERE uid = $1")
                .bind(uid)
                .bind(availability)
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    AppError::from_write(err, Collection::Users.doc_path(uid), WriteOp::Update)
                })?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_child(&self, parent_uid: &str, child_uid: &str) -> AppResult<bool> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE campus_guardian.users
            SET children_uids = CASE
                WHEN $2 = ANY(children_uids) THEN children_uids
                ELSE array_append(children_uids, $2)
            END
            WHERE uid = $1
            "#,
        )
        .bind(parent_uid)
        .bind(child_uid)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            AppError::from_write(err, Collection::Users.doc_path(parent_uid), WriteOp::Update)
        })?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, uid: &str) -> AppResult<bool> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("DELETE FROM campus_guardian.users WHERE uid = $1")
            .bind(uid)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                AppError::from_write(err, Collection::Users.doc_path(uid), WriteOp::Delete)
            })?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_incident(&self, incident: &NewIncident) -> AppResult<Incident> {
        let id = Uuid::new_v4();
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO campus_guardian.incidents
            (id, incident_type, transcript, latitude, longitude, status, reporter_id,
             reporter_name, target_student_id, target_student_name, voice_recording_url,
             media_urls)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {INCIDENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(incident.incident_type.as_str())
        .bind(&incident.transcript)
        .bind(incident.location.latitude)
        .bind(incident.location.longitude)
        .bind(IncidentStatus::Reported.as_str())
        .bind(&incident.reporter_id)
        .bind(&incident.reporter_name)
        .bind(&incident.target_student_id)
        .bind(&incident.target_student_name)
        .bind(&incident.voice_recording_url)
        .bind(&incident.media_urls)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            AppError::from_write(err, Collection::Incidents.doc_path(id), WriteOp::Create)
        })?;
        tx.commit().await?;
        incident_from_row(&row)
    }

    async fn get_incident(&self, id: Uuid) -> AppResult<Option<Incident>> {
        let row = sqlx::query(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM campus_guardian.incidents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(incident_from_row).transpose()
    }

    async fn update_incident_status(&self, id: Uuid, status: IncidentStatus) -> AppResult<bool> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("UPDATE campus_guardian.incidents SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                AppError::from_write(err, Collection::Incidents.doc_path(id), WriteOp::Update)
            })?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_incident(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("DELETE FROM campus_guardian.incidents WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                AppError::from_write(err, Collection::Incidents.doc_path(id), WriteOp::Delete)
            })?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_incidents(&self, scope: &IncidentScope) -> AppResult<Vec<Incident>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {INCIDENT_COLUMNS} FROM campus_guardian.incidents"
        ));
        match scope {
            IncidentScope::All => {}
            IncidentScope::ReportedBy(uid) => {
                query.push(" WHERE reporter_id = ").push_bind(uid.clone());
            }
            IncidentScope::Involving(uid) => {
                query
                    .push(" WHERE reporter_id = ")
                    .push_bind(uid.clone())
                    .push(" OR target_student_id = ")
                    .push_bind(uid.clone());
            }
            IncidentScope::TargetingAny(uids) => {
                if uids.is_empty() {
                    return Ok(Vec::new());
                }
                query
                    .push(" WHERE target_student_id = ANY(")
                    .push_bind(uids.clone())
                    .push(")");
            }
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        let rows = query.build().fetch_all(&self.pool).await?;
        collect(&rows, incident_from_row)
    }

    async fn fetch_incident_page(
        &self,
        filter: &IncidentFilter,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> AppResult<Vec<Incident>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {INCIDENT_COLUMNS} FROM campus_guardian.incidents WHERE TRUE"
        ));
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(incident_type) = filter.incident_type {
            query
                .push(" AND incident_type = ")
                .push_bind(incident_type.as_str());
        }
        if let Some(cursor) = cursor {
            query
                .push(" AND (created_at, id) < (")
                .push_bind(cursor.created_at)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit as i64);

        let rows = query.build().fetch_all(&self.pool).await?;
        collect(&rows, incident_from_row)
    }

    async fn assign_wellness(
        &self,
        incident_id: Uuid,
        appointment: &NewAppointment,
    ) -> AppResult<WellnessOutcome> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(
            "SELECT status FROM campus_guardian.incidents WHERE id = $1 FOR UPDATE",
        )
        .bind(incident_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(WellnessOutcome::IncidentMissing);
        };
        let status: IncidentStatus = row.try_get::<String, _>("status")?.parse()?;
        if status == IncidentStatus::WellnessAssigned {
            return Ok(WellnessOutcome::AlreadyAssigned);
        }

        let appointment_id = Uuid::new_v4();
        let row = insert_appointment_query(appointment_id, appointment)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| {
                AppError::from_write(
                    err,
                    Collection::Appointments.doc_path(appointment_id),
                    WriteOp::Create,
                )
            })?;
        let created = appointment_from_row(&row)?;

        sqlx::query("UPDATE campus_guardian.incidents SET status = $2 WHERE id = $1")
            .bind(incident_id)
            .bind(IncidentStatus::WellnessAssigned.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                AppError::from_write(
                    err,
                    Collection::Incidents.doc_path(incident_id),
                    WriteOp::Update,
                )
            })?;

        tx.commit().await?;
        Ok(WellnessOutcome::Assigned(created))
    }

    async fn insert_appointment(&self, appointment: &NewAppointment) -> AppResult<Appointment> {
        let id = Uuid::new_v4();
        let mut tx = self.begin().await?;
        let row = insert_appointment_query(id, appointment)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| {
                AppError::from_write(err, Collection::Appointments.doc_path(id), WriteOp::Create)
            })?;
        tx.commit().await?;
        appointment_from_row(&row)
    }

    async fn get_appointment(&self, id: Uuid) -> AppResult<Option<Appointment>> {
        let row = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM campus_guardian.appointments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(appointment_from_row).transpose()
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> AppResult<bool> {
        let mut tx = self.begin().await?;
        let result =
            sqlx::query("UPDATE campus_guardian.appointments SET status = $2 WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    AppError::from_write(
                        err,
                        Collection::Appointments.doc_path(id),
                        WriteOp::Update,
                    )
                })?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_appointments(
        &self,
        scope: &AppointmentScope,
    ) -> AppResult<Vec<Appointment>> {
        let (column, uid) = match scope {
            AppointmentScope::ForStudent(uid) => ("student_id", uid),
            AppointmentScope::ForStaff(uid) => ("staff_id", uid),
        };
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM campus_guardian.appointments \
             WHERE {column} = $1 ORDER BY scheduled_at, id"
        ))
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, appointment_from_row)
    }

    async fn insert_sos(
        &self,
        uid: &str,
        user_name: &str,
        coords: GeoPoint,
    ) -> AppResult<SosAlert> {
        let id = Uuid::new_v4();
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO campus_guardian.sos_alerts
            (id, uid, user_name, latitude, longitude, active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING {SOS_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(uid)
        .bind(user_name)
        .bind(coords.latitude)
        .bind(coords.longitude)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            AppError::from_write(err, Collection::SosAlerts.doc_path(id), WriteOp::Create)
        })?;
        tx.commit().await?;
        sos_from_row(&row)
    }

    async fn active_sos(&self) -> AppResult<Vec<SosAlert>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOS_COLUMNS} FROM campus_guardian.sos_alerts \
             WHERE active ORDER BY raised_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, sos_from_row)
    }

    async fn insert_guest_log(&self, name: &str, purpose: &str) -> AppResult<GuestLog> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO campus_guardian.guest_logs (id, name, purpose)
            VALUES ($1, $2, $3)
            RETURNING id, name, purpose, checked_in_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(purpose)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            AppError::from_write(err, Collection::GuestLogs.doc_path(id), WriteOp::Create)
        })?;

        Ok(GuestLog {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            purpose: row.try_get("purpose")?,
            checked_in_at: row.try_get("checked_in_at")?,
        })
    }
}

fn insert_appointment_query(
    id: Uuid,
    appointment: &NewAppointment,
) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO campus_guardian.appointments
        (id, student_id, student_name, staff_id, staff_name, appointment_type, notes, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
        RETURNING id, student_id, student_name, staff_id, staff_name,
                  appointment_type, scheduled_at, notes, status
        "#,
    )
    .bind(id)
    .bind(&appointment.student_id)
    .bind(&appointment.student_name)
    .bind(&appointment.staff_id)
    .bind(&appointment.staff_name)
    .bind(appointment.appointment_type.as_str())
    .bind(&appointment.notes)
}
