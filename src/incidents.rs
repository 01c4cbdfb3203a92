use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blobs::{upload_attachments, Attachment, BlobStore};
use crate::classify::Classifier;
use crate::error::{AppError, AppResult};
use crate::events::{ErrorBus, WriteOp};
use crate::live::LiveQuery;
use crate::models::{
    Appointment, AppointmentType, Cursor, GeoPoint, Incident, IncidentFilter, IncidentScope,
    IncidentStatus, NewAppointment, NewIncident, Role, UserProfile,
};
use crate::store::{Collection, Store, WellnessOutcome};
use crate::users::require_role;

pub const WELLNESS_STAFF_ID: &str = "wellness_dept";
pub const WELLNESS_STAFF_NAME: &str = "Wellness Center";
pub const GUARD_REPORTER_NAME: &str = "Campus Security";
const MIN_COMPLAINT_LEN: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub transcript: String,
    pub reporter_id: String,
    pub reporter_name: String,
    pub target_student_id: Option<String>,
    pub location: Option<GeoPoint>,
    pub attachments: Vec<Attachment>,
}

pub struct IncidentManager {
    store: Arc<dyn Store>,
    classifier: Arc<dyn Classifier>,
    blobs: Arc<dyn BlobStore>,
    bus: ErrorBus,
    submitting: Mutex<HashSet<String>>,
}

/// Marks a reporter as mid-submission until dropped.
struct SubmitGuard<'a> {
    pending: &'a Mutex<HashSet<String>>,
    reporter_id: String,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.reporter_id);
        }
    }
}

impl IncidentManager {
    pub fn new(
        store: Arc<dyn Store>,
        classifier: Arc<dyn Classifier>,
        blobs: Arc<dyn BlobStore>,
        bus: ErrorBus,
    ) -> Self {
        Self {
            store,
            classifier,
            blobs,
            bus,
            submitting: Mutex::new(HashSet::new()),
        }
    }

    fn begin_submit(&self, reporter_id: &str) -> AppResult<SubmitGuard<'_>> {
        let mut pending = self
            .submitting
            .lock()
            .map_err(|_| AppError::Busy)?;
        if !pending.insert(reporter_id.to_string()) {
            return Err(AppError::Busy);
        }
        Ok(SubmitGuard {
            pending: &self.submitting,
            reporter_id: reporter_id.to_string(),
        })
    }

    /// Classifies, uploads, then writes. Nothing is written if an earlier step fails.
    pub async fn submit<F>(&self, submission: Submission, progress: F) -> AppResult<Incident>
    where
        F: FnMut(f32),
    {
        let transcript = submission.transcript.trim().to_string();
        if transcript.is_empty() {
            return Err(AppError::validation("transcript", "Cannot submit an empty report."));
        }
        let _guard = self.begin_submit(&submission.reporter_id)?;

        let target_student_name = match &submission.target_student_id {
            Some(uid) => match self.store.get_user(uid).await? {
                Some(profile) => Some(profile.name),
                None => {
                    warn!(student = %uid, "incident target not found");
                    return Err(AppError::not_found("student", uid.clone()));
                }
            },
            None => None,
        };

        let incident_type = self.classifier.classify(&transcript).await?;
        let uploaded =
            upload_attachments(self.blobs.as_ref(), &submission.attachments, progress).await?;

        let new = NewIncident {
            incident_type,
            transcript,
            location: submission.location.unwrap_or_default(),
            reporter_id: submission.reporter_id,
            reporter_name: submission.reporter_name,
            target_student_id: submission.target_student_id,
            target_student_name,
            voice_recording_url: uploaded.voice_recording_url,
            media_urls: uploaded.media_urls,
        };

        let incident = self.store.insert_incident(&new).await.map_err(|err| {
            self.bus.report(
                err,
                Collection::Incidents.as_str(),
                WriteOp::Create,
                Some(&new),
            )
        })?;
        info!(id = %incident.id, incident_type = %incident.incident_type, "incident reported");
        Ok(incident)
    }

    /// Guard voice report. A missing device location is stored as (0, 0).
    pub async fn report_as_guard<F>(
        &self,
        guard: &UserProfile,
        transcript: String,
        target_student_id: Option<String>,
        location: Option<GeoPoint>,
        attachments: Vec<Attachment>,
        progress: F,
    ) -> AppResult<Incident>
    where
        F: FnMut(f32),
    {
        if location.is_none() {
            warn!("no device location, submitting without location data");
        }
        self.submit(
            Submission {
                transcript,
                reporter_id: guard.uid.clone(),
                reporter_name: GUARD_REPORTER_NAME.to_string(),
                target_student_id: target_student_id.filter(|id| !id.trim().is_empty()),
                location,
                attachments,
            },
            progress,
        )
        .await
    }

    pub async fn file_complaint(
        &self,
        reporter: &UserProfile,
        target_student_id: &str,
        description: String,
    ) -> AppResult<Incident> {
        if target_student_id.trim().is_empty() {
            return Err(AppError::validation(
                "target_student_id",
                "Please enter the ID of the student you are reporting.",
            ));
        }
        if description.trim().chars().count() < MIN_COMPLAINT_LEN {
            return Err(AppError::validation(
                "description",
                "Please provide a detailed description of the incident (min. 20 characters).",
            ));
        }
        self.submit(
            Submission {
                transcript: description,
                reporter_id: reporter.uid.clone(),
                reporter_name: reporter.name.clone(),
                target_student_id: Some(target_student_id.trim().to_string()),
                location: None,
                attachments: Vec::new(),
            },
            |_| {},
        )
        .await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Incident> {
        self.store
            .get_incident(id)
            .await?
            .ok_or_else(|| AppError::not_found("incident", id.to_string()))
    }

    pub async fn assign_wellness(&self, actor: &UserProfile, id: Uuid) -> AppResult<Appointment> {
        let path = Collection::Incidents.doc_path(id);
        require_role(actor, Role::Admin, path.clone(), WriteOp::Update)
            .map_err(|err| self.bus.report::<()>(err, path.clone(), WriteOp::Update, None))?;

        let incident = self.get(id).await?;
        if incident.status == IncidentStatus::WellnessAssigned {
            return Err(AppError::AlreadyWellnessAssigned);
        }
        let (Some(student_id), Some(student_name)) = (
            incident.target_student_id.clone(),
            incident.target_student_name.clone(),
        ) else {
            return Err(AppError::IncompleteIncident);
        };

        let appointment = NewAppointment {
            student_id,
            student_name,
            staff_id: WELLNESS_STAFF_ID.to_string(),
            staff_name: WELLNESS_STAFF_NAME.to_string(),
            appointment_type: AppointmentType::WellnessSession,
            notes: wellness_notes(&incident),
        };

        let outcome = self
            .store
            .assign_wellness(id, &appointment)
            .await
            .map_err(|err| {
                self.bus.report(err, path.clone(), WriteOp::Update, Some(&appointment))
            })?;

        match outcome {
            WellnessOutcome::Assigned(created) => {
                info!(
                    incident = %id,
                    appointment = %created.id,
                    "wellness session assigned for {}",
                    created.student_name
                );
                Ok(created)
            }
            WellnessOutcome::AlreadyAssigned => Err(AppError::AlreadyWellnessAssigned),
            WellnessOutcome::IncidentMissing => {
                Err(AppError::not_found("incident", id.to_string()))
            }
        }
    }

    /// Administrative status change. Concurrent changes are last-write-wins.
    pub async fn set_status(
        &self,
        actor: &UserProfile,
        id: Uuid,
        status: IncidentStatus,
    ) -> AppResult<()> {
        let path = Collection::Incidents.doc_path(id);
        let payload = serde_json::json!({ "status": status });
        let result = match require_role(actor, Role::Admin, path.clone(), WriteOp::Update) {
            Ok(()) => self.store.update_incident_status(id, status).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(true) => {
                info!(incident = %id, status = %status, "incident status updated");
                Ok(())
            }
            Ok(false) => Err(AppError::not_found("incident", id.to_string())),
            Err(err) => Err(self.bus.report(err, path, WriteOp::Update, Some(&payload))),
        }
    }

    /// Same as [`set_status`](Self::set_status) without waiting. Failures surface only on the bus.
    pub fn set_status_detached(
        &self,
        actor: &UserProfile,
        id: Uuid,
        status: IncidentStatus,
    ) -> JoinHandle<()> {
        let path = Collection::Incidents.doc_path(id);
        let payload = serde_json::json!({ "status": status });
        let allowed = require_role(actor, Role::Admin, path.clone(), WriteOp::Update);
        let store = self.store.clone();
        self.bus
            .spawn_write(path, WriteOp::Update, Some(payload), async move {
                allowed?;
                if store.update_incident_status(id, status).await? {
                    Ok(())
                } else {
                    Err(AppError::not_found("incident", id.to_string()))
                }
            })
    }

    pub async fn delete(&self, actor: &UserProfile, id: Uuid) -> AppResult<()> {
        let path = Collection::Incidents.doc_path(id);
        let result = match require_role(actor, Role::Admin, path.clone(), WriteOp::Delete) {
            Ok(()) => self.store.delete_incident(id).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(true) => {
                info!(incident = %id, "incident deleted");
                Ok(())
            }
            Ok(false) => Err(AppError::not_found("incident", id.to_string())),
            Err(err) => Err(self.bus.report::<()>(err, path, WriteOp::Delete, None)),
        }
    }

    pub async fn fetch_page(
        &self,
        filter: &IncidentFilter,
        cursor: Option<Cursor>,
        page_size: usize,
    ) -> AppResult<Vec<Incident>> {
        self.store
            .fetch_incident_page(filter, cursor, page_size.max(1))
            .await
    }

    pub fn subscribe(&self, scope: IncidentScope) -> LiveQuery<Incident> {
        let store = self.store.clone();
        LiveQuery::spawn(Collection::Incidents, self.store.changes(), move || {
            let store = store.clone();
            let scope = scope.clone();
            async move { store.query_incidents(&scope).await }
        })
    }

    pub async fn list(&self, scope: &IncidentScope) -> AppResult<Vec<Incident>> {
        self.store.query_incidents(scope).await
    }
}

fn wellness_notes(incident: &Incident) -> String {
    format!(
        "Mandatory session following incident #{} on {}. Type: {}.",
        incident.id,
        incident.created_at.format("%B %-d, %Y"),
        incident.incident_type
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Shown,
    /// The requested page was empty, an earlier page is shown instead.
    FellBack,
}

pub struct IncidentPager {
    filter: IncidentFilter,
    page_size: usize,
    starts: Vec<Option<Cursor>>,
    current: Vec<Incident>,
}

impl IncidentPager {
    pub fn new(filter: IncidentFilter, page_size: usize) -> Self {
        Self {
            filter,
            page_size: page_size.max(1),
            starts: vec![None],
            current: Vec::new(),
        }
    }

    pub fn page_number(&self) -> usize {
        self.starts.len()
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.current
    }

    pub async fn set_filter(
        &mut self,
        manager: &IncidentManager,
        filter: IncidentFilter,
    ) -> AppResult<PageOutcome> {
        self.filter = filter;
        self.first(manager).await
    }

    pub async fn first(&mut self, manager: &IncidentManager) -> AppResult<PageOutcome> {
        self.starts = vec![None];
        self.load(manager).await
    }

    pub async fn next(&mut self, manager: &IncidentManager) -> AppResult<PageOutcome> {
        let Some(last) = self.current.last() else {
            return Ok(PageOutcome::Shown);
        };
        self.starts.push(Some(Cursor::after(last)));
        self.load(manager).await
    }

    pub async fn previous(&mut self, manager: &IncidentManager) -> AppResult<PageOutcome> {
        if self.starts.len() > 1 {
            self.starts.pop();
        }
        self.load(manager).await
    }

    /// Loads the page at the top of the stack, stepping back while pages past the first are empty.
    async fn load(&mut self, manager: &IncidentManager) -> AppResult<PageOutcome> {
        let mut outcome = PageOutcome::Shown;
        loop {
            let start = self.starts.last().copied().flatten();
            let page = manager
                .fetch_page(&self.filter, start, self.page_size)
                .await?;
            if page.is_empty() && self.starts.len() > 1 {
                self.starts.pop();
                outcome = PageOutcome::FellBack;
                continue;
            }
            self.current = page;
            return Ok(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::{AttachmentKind, FsBlobStore};
    use crate::classify::stub::StubClassifier;
    use crate::memory::MemoryStore;
    use crate::models::IncidentType;

    struct Fixture {
        store: Arc<MemoryStore>,
        classifier: Arc<StubClassifier>,
        bus: ErrorBus,
        manager: IncidentManager,
        _blob_dir: tempfile::TempDir,
    }

    fn profile(uid: &str, name: &str, role: Role) -> UserProfile {
        UserProfile {
            uid: uid.to_string(),
            name: name.to_string(),
            email: format!("{uid}@hitam.org"),
            role,
            department: None,
            language_preference: None,
            children_uids: Vec::new(),
            availability: None,
            mobile_number: None,
        }
    }

    async fn fixture_with(classifier: StubClassifier) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_user(&profile("stud1", "A. Kumar", Role::Student))
            .await
            .unwrap();
        let classifier = Arc::new(classifier);
        let blob_dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(FsBlobStore::new(blob_dir.path(), "http://localhost/blobs"));
        let bus = ErrorBus::new();
        let manager = IncidentManager::new(store.clone(), classifier.clone(), blobs, bus.clone());
        Fixture {
            store,
            classifier,
            bus,
            manager,
            _blob_dir: blob_dir,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(StubClassifier::returning(IncidentType::Intimidation)).await
    }

    fn admin() -> UserProfile {
        profile("admin1", "Priya Raman", Role::Admin)
    }

    fn guard() -> UserProfile {
        profile("guard1", "Ravi Teja", Role::Guard)
    }

    async fn seed_incidents(f: &Fixture, count: usize) -> Vec<Incident> {
        let mut created = Vec::new();
        for n in 0..count {
            created.push(
                f.manager
                    .report_as_guard(
                        &guard(),
                        format!("incident number {n}"),
                        None,
                        None,
                        Vec::new(),
                        |_| {},
                    )
                    .await
                    .unwrap(),
            );
        }
        created
    }

    #[tokio::test]
    async fn guard_report_resolves_target_and_defaults_location() {
        let f = fixture().await;
        let incident = f
            .manager
            .report_as_guard(
                &guard(),
                "He screamed at me and blocked my path".to_string(),
                Some("stud1".to_string()),
                None,
                Vec::new(),
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(incident.target_student_name.as_deref(), Some("A. Kumar"));
        assert_eq!(incident.status, IncidentStatus::Reported);
        assert!(IncidentType::ALL.contains(&incident.incident_type));
        assert_eq!(incident.location, GeoPoint::new(0.0, 0.0));
        assert_eq!(incident.reporter_id, "guard1");
        assert_eq!(incident.reporter_name, GUARD_REPORTER_NAME);
    }

    #[tokio::test]
    async fn unknown_target_fails_before_classification() {
        let f = fixture().await;
        let err = f
            .manager
            .report_as_guard(
                &guard(),
                "shoved a student".to_string(),
                Some("ghost".to_string()),
                None,
                Vec::new(),
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound { entity: "student", .. }));
        assert_eq!(f.classifier.calls(), 0);
        assert_eq!(f.store.incident_count(), 0);
    }

    #[tokio::test]
    async fn classification_failure_writes_nothing() {
        let f = fixture_with(StubClassifier::failing()).await;
        let err = f
            .manager
            .report_as_guard(
                &guard(),
                "something happened".to_string(),
                None,
                None,
                Vec::new(),
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Classification(_)));
        assert_eq!(f.store.incident_count(), 0);
    }

    #[tokio::test]
    async fn empty_transcript_is_a_validation_error() {
        let f = fixture().await;
        let mut errors = f.bus.subscribe();
        let err = f
            .manager
            .report_as_guard(&guard(), "   ".to_string(), None, None, Vec::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "transcript", .. }));
        assert_eq!(f.classifier.calls(), 0);
        assert!(errors.try_recv().is_none());
    }

    #[tokio::test]
    async fn complaint_requires_detail_and_snapshots_names() {
        let f = fixture().await;
        let reporter = profile("stud2", "Sana Shaikh", Role::Student);

        let short = f
            .manager
            .file_complaint(&reporter, "stud1", "too short".to_string())
            .await
            .unwrap_err();
        assert!(matches!(short, AppError::Validation { field: "description", .. }));

        let incident = f
            .manager
            .file_complaint(
                &reporter,
                "stud1",
                "Keeps mocking my accent in every seminar".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(incident.reporter_name, "Sana Shaikh");
        assert_eq!(incident.target_student_name.as_deref(), Some("A. Kumar"));
        assert!(incident.location.is_unknown());
    }

    #[tokio::test]
    async fn attachments_are_uploaded_before_the_write() {
        let f = fixture().await;
        let attachments = vec![Attachment {
            kind: AttachmentKind::Voice,
            file_name: "clip.webm".to_string(),
            bytes: vec![1, 2, 3],
        }];
        let mut progress = Vec::new();
        let incident = f
            .manager
            .report_as_guard(
                &guard(),
                "loud threats".to_string(),
                None,
                Some(GeoPoint::new(17.29, 78.47)),
                attachments,
                |p| progress.push(p),
            )
            .await
            .unwrap();

        assert_eq!(progress, vec![1.0]);
        let url = incident.voice_recording_url.unwrap();
        assert!(url.starts_with("http://localhost/blobs/incidents/"));
        assert_eq!(incident.location, GeoPoint::new(17.29, 78.47));
    }

    #[tokio::test]
    async fn permission_denied_write_is_published() {
        let f = fixture().await;
        let mut errors = f.bus.subscribe();
        f.store.deny_writes(Collection::Incidents);

        let err = f
            .manager
            .report_as_guard(
                &guard(),
                "threatening note".to_string(),
                None,
                None,
                Vec::new(),
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(err.is_permission_denied());
        let failure = errors.try_recv().unwrap();
        assert!(failure.is_access_denied());
        assert_eq!(failure.operation, WriteOp::Create);
        assert_eq!(failure.payload.unwrap()["transcript"], "threatening note");
    }

    #[tokio::test]
    async fn wellness_assignment_is_single_shot() {
        let f = fixture().await;
        let incident = f
            .manager
            .report_as_guard(
                &guard(),
                "cornered near the lab".to_string(),
                Some("stud1".to_string()),
                None,
                Vec::new(),
                |_| {},
            )
            .await
            .unwrap();

        let appointment = f.manager.assign_wellness(&admin(), incident.id).await.unwrap();
        assert_eq!(appointment.staff_id, WELLNESS_STAFF_ID);
        assert_eq!(appointment.staff_name, WELLNESS_STAFF_NAME);
        assert_eq!(appointment.student_id, "stud1");
        assert_eq!(appointment.appointment_type, AppointmentType::WellnessSession);
        assert!(appointment.notes.contains(&format!("#{}", incident.id)));
        assert!(appointment.notes.ends_with("Type: Intimidation."));

        let stored = f.manager.get(incident.id).await.unwrap();
        assert_eq!(stored.status, IncidentStatus::WellnessAssigned);

        let again = f.manager.assign_wellness(&admin(), incident.id).await.unwrap_err();
        assert!(matches!(again, AppError::AlreadyWellnessAssigned));
        assert_eq!(f.store.appointment_count(), 1);
    }

    #[tokio::test]
    async fn wellness_needs_target_student() {
        let f = fixture().await;
        let incident = seed_incidents(&f, 1).await.remove(0);
        let err = f.manager.assign_wellness(&admin(), incident.id).await.unwrap_err();
        assert!(matches!(err, AppError::IncompleteIncident));
        assert_eq!(f.store.appointment_count(), 0);
    }

    #[tokio::test]
    async fn denied_wellness_write_leaves_both_halves_untouched() {
        let f = fixture().await;
        let incident = f
            .manager
            .report_as_guard(
                &guard(),
                "followed to the hostel".to_string(),
                Some("stud1".to_string()),
                None,
                Vec::new(),
                |_| {},
            )
            .await
            .unwrap();
        let mut errors = f.bus.subscribe();
        f.store.deny_writes(Collection::Appointments);

        let err = f.manager.assign_wellness(&admin(), incident.id).await.unwrap_err();
        assert!(err.is_permission_denied());
        assert!(errors.try_recv().unwrap().is_access_denied());
        assert_eq!(f.store.appointment_count(), 0);
        assert_eq!(
            f.manager.get(incident.id).await.unwrap().status,
            IncidentStatus::Reported
        );

        f.store.allow_writes(Collection::Appointments);
        f.manager.assign_wellness(&admin(), incident.id).await.unwrap();
    }

    #[tokio::test]
    async fn non_admin_cannot_triage() {
        let f = fixture().await;
        let incident = seed_incidents(&f, 1).await.remove(0);
        let mut errors = f.bus.subscribe();

        let err = f
            .manager
            .set_status(&guard(), incident.id, IncidentStatus::Resolved)
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());
        assert!(errors.try_recv().unwrap().is_access_denied());

        let err = f.manager.delete(&guard(), incident.id).await.unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(f.store.incident_count(), 1);
    }

    #[tokio::test]
    async fn detached_status_failure_only_reaches_the_bus() {
        let f = fixture().await;
        let incident = seed_incidents(&f, 1).await.remove(0);
        let mut errors = f.bus.subscribe();
        f.store.deny_writes(Collection::Incidents);

        f.manager
            .set_status_detached(&admin(), incident.id, IncidentStatus::Resolved)
            .await
            .unwrap();

        let failure = errors.recv().await.unwrap();
        assert!(failure.is_access_denied());
        assert_eq!(failure.path, Collection::Incidents.doc_path(incident.id));
        assert_eq!(failure.payload.unwrap()["status"], "resolved");
        assert_eq!(
            f.manager.get(incident.id).await.unwrap().status,
            IncidentStatus::Reported
        );
    }

    #[tokio::test]
    async fn concurrent_status_writes_are_last_write_wins() {
        let f = Arc::new(fixture().await);
        let incident = seed_incidents(&f, 1).await.remove(0);

        let a = {
            let f = f.clone();
            tokio::spawn(async move {
                f.manager
                    .set_status(&admin(), incident.id, IncidentStatus::InProgress)
                    .await
            })
        };
        let b = {
            let f = f.clone();
            tokio::spawn(async move {
                f.manager
                    .set_status(&admin(), incident.id, IncidentStatus::Resolved)
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let status = f.manager.get(incident.id).await.unwrap().status;
        assert!(matches!(
            status,
            IncidentStatus::InProgress | IncidentStatus::Resolved
        ));
    }

    #[tokio::test]
    async fn status_filter_returns_only_matching_documents() {
        let f = fixture().await;
        let created = seed_incidents(&f, 5).await;
        for incident in created.iter().take(2) {
            f.manager
                .set_status(&admin(), incident.id, IncidentStatus::Resolved)
                .await
                .unwrap();
        }

        let filter = IncidentFilter {
            status: Some(IncidentStatus::Resolved),
            incident_type: None,
        };
        let page = f.manager.fetch_page(&filter, None, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|i| i.status == IncidentStatus::Resolved));
    }

    #[tokio::test]
    async fn pager_walks_newest_first() {
        let f = fixture().await;
        let created = seed_incidents(&f, 5).await;
        let mut pager = IncidentPager::new(IncidentFilter::default(), 2);

        pager.first(&f.manager).await.unwrap();
        let ids: Vec<Uuid> = pager.incidents().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![created[4].id, created[3].id]);

        pager.next(&f.manager).await.unwrap();
        pager.next(&f.manager).await.unwrap();
        assert_eq!(pager.page_number(), 3);
        assert_eq!(pager.incidents().len(), 1);
        assert_eq!(pager.incidents()[0].id, created[0].id);

        pager.previous(&f.manager).await.unwrap();
        assert_eq!(pager.page_number(), 2);
        assert_eq!(pager.incidents()[0].id, created[2].id);
    }

    #[tokio::test]
    async fn changing_filter_restarts_at_first_page() {
        let f = fixture().await;
        let created = seed_incidents(&f, 4).await;
        f.manager
            .set_status(&admin(), created[0].id, IncidentStatus::Resolved)
            .await
            .unwrap();

        let mut pager = IncidentPager::new(IncidentFilter::default(), 2);
        pager.first(&f.manager).await.unwrap();
        pager.next(&f.manager).await.unwrap();
        assert_eq!(pager.page_number(), 2);

        let resolved = IncidentFilter {
            status: Some(IncidentStatus::Resolved),
            incident_type: None,
        };
        pager.set_filter(&f.manager, resolved).await.unwrap();
        assert_eq!(pager.page_number(), 1);
        let ids: Vec<Uuid> = pager.incidents().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![created[0].id]);
    }

    #[tokio::test]
    async fn empty_next_page_falls_back() {
        let f = fixture().await;
        let created = seed_incidents(&f, 3).await;
        let mut pager = IncidentPager::new(IncidentFilter::default(), 2);
        pager.first(&f.manager).await.unwrap();
        pager.next(&f.manager).await.unwrap();
        assert_eq!(pager.page_number(), 2);

        f.manager.delete(&admin(), created[0].id).await.unwrap();
        let outcome = pager.next(&f.manager).await.unwrap();
        assert_eq!(outcome, PageOutcome::FellBack);
        assert_eq!(pager.page_number(), 1);
        assert_eq!(pager.incidents().len(), 2);
    }

    #[tokio::test]
    async fn empty_first_page_is_shown() {
        let f = fixture().await;
        let mut pager = IncidentPager::new(
            IncidentFilter {
                status: Some(IncidentStatus::Resolved),
                incident_type: None,
            },
            10,
        );
        assert_eq!(pager.first(&f.manager).await.unwrap(), PageOutcome::Shown);
        assert!(pager.incidents().is_empty());
        assert_eq!(pager.next(&f.manager).await.unwrap(), PageOutcome::Shown);
        assert_eq!(pager.page_number(), 1);
    }

    #[tokio::test]
    async fn deleted_incident_leaves_list_and_live_view() {
        let f = fixture().await;
        let created = seed_incidents(&f, 2).await;
        let mut live = f.manager.subscribe(IncidentScope::All);
        assert_eq!(live.next_ok().await.unwrap().len(), 2);

        f.manager.delete(&admin(), created[0].id).await.unwrap();

        let snapshot = live.next_ok().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, created[1].id);
        let page = f
            .manager
            .fetch_page(&IncidentFilter::default(), None, 10)
            .await
            .unwrap();
        assert!(page.iter().all(|i| i.id != created[0].id));

        let err = f.manager.delete(&admin(), created[0].id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn concurrent_submissions_from_one_reporter_are_refused() {
        let f = fixture().await;
        let _held = f.manager.begin_submit("guard1").unwrap();
        let err = f
            .manager
            .report_as_guard(&guard(), "second tap".to_string(), None, None, Vec::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Busy));
        drop(_held);
        assert!(f.manager.begin_submit("guard1").is_ok());
    }
}
