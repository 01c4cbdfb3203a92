use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, ensure, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod alerts;
mod appointments;
mod blobs;
mod classify;
mod config;
mod db;
mod error;
mod events;
mod export;
mod incidents;
mod live;
#[cfg(test)]
mod memory;
mod models;
mod nav;
mod report;
mod store;
mod trends;
mod users;

use alerts::Alerts;
use appointments::AppointmentManager;
use blobs::{Attachment, AttachmentKind, FsBlobStore};
use classify::HttpClassifier;
use config::Config;
use error::AppError;
use events::ErrorBus;
use incidents::{IncidentManager, IncidentPager, PageOutcome, WELLNESS_STAFF_ID};
use models::{
    Appointment, AppointmentScope, AppointmentType, GeoPoint, Incident, IncidentFilter,
    IncidentScope, IncidentStatus, IncidentType, Role, UserProfile,
};
use store::Store;
use users::{Signup, UserDirectory};

#[derive(Parser)]
#[command(name = "campus-guardian")]
#[command(about = "Campus incident reporting and counselling sessions", long_about = None)]
struct Cli {
    /// User ID to act as
    #[arg(long = "as", global = true)]
    actor: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PageArgs {
    #[arg(long)]
    status: Option<IncidentStatus>,
    #[arg(long = "type")]
    incident_type: Option<IncidentType>,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long)]
    page_size: Option<usize>,
}

#[derive(Args)]
struct LocationArgs {
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
}

impl LocationArgs {
    fn point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Create a profile for an authenticated identity
    Signup {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        mobile: String,
        #[arg(long, default_value = "student")]
        role: Role,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        admin_code: Option<String>,
    },
    /// Submit a guard report from a transcript and optional recordings
    ReportIncident {
        #[arg(long)]
        transcript: String,
        #[arg(long)]
        student: Option<String>,
        #[command(flatten)]
        location: LocationArgs,
        #[arg(long)]
        voice: Option<PathBuf>,
        #[arg(long)]
        media: Vec<PathBuf>,
    },
    /// File a complaint against another student
    FileComplaint {
        #[arg(long)]
        student: String,
        #[arg(long)]
        description: String,
    },
    /// Change an incident's status
    SetStatus {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        status: IncidentStatus,
        /// Return immediately; failures are only logged
        #[arg(long)]
        detach: bool,
    },
    /// Book a mandatory wellness session for an incident's target student
    AssignWellness {
        #[arg(long)]
        id: Uuid,
    },
    DeleteIncident {
        #[arg(long)]
        id: Uuid,
    },
    /// List incidents newest first, one page at a time
    Incidents {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Write the selected page of incidents as CSV
    Export {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Print live snapshots of the caller's view until interrupted
    Watch,
    /// Request a session with a faculty member
    Book {
        #[arg(long)]
        staff: String,
        #[arg(long = "type")]
        appointment_type: AppointmentType,
        #[arg(long)]
        notes: String,
    },
    Approve {
        #[arg(long)]
        id: Uuid,
    },
    Reschedule {
        #[arg(long)]
        id: Uuid,
    },
    Complete {
        #[arg(long)]
        id: Uuid,
    },
    /// Publish free-text availability for students booking sessions
    Availability {
        #[arg(long)]
        text: String,
    },
    /// List faculty members and their published availability
    Faculty,
    /// List the caller's sessions
    Sessions,
    /// Raise an SOS alert at the given position
    Sos {
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Record a visitor in the guest log
    CheckIn {
        #[arg(long)]
        name: String,
        #[arg(long)]
        purpose: String,
    },
    Users {
        #[arg(long)]
        role: Option<Role>,
    },
    SetRole {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        role: Role,
    },
    DeleteUser {
        #[arg(long)]
        uid: String,
    },
    /// Link a student to a parent account
    LinkChild {
        #[arg(long)]
        parent: String,
        #[arg(long)]
        student: String,
    },
    /// Show the caller's role-specific overview
    Dashboard,
    /// Show navigation entries for a role
    Nav {
        #[arg(long)]
        role: Option<Role>,
    },
    /// Print located incidents as JSON map markers
    Map,
    /// Score students by incidents naming them
    Trends {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown overview
    Report {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

struct App {
    users: UserDirectory,
    incidents: IncidentManager,
    appointments: AppointmentManager,
    alerts: Alerts,
    page_size: usize,
}

impl App {
    fn new(config: &Config, store: Arc<dyn Store>, bus: &ErrorBus) -> anyhow::Result<Self> {
        let classifier = HttpClassifier::new(
            config.classifier_url.clone(),
            config.classifier_api_key.clone(),
            config.classifier_model.clone(),
            config.classifier_timeout,
        )?;
        let blobs = FsBlobStore::new(config.blob_root.clone(), config.blob_public_url.clone());

        Ok(Self {
            users: UserDirectory::new(
                store.clone(),
                bus.clone(),
                config.email_domain.clone(),
                config.admin_signup_code.clone(),
            ),
            incidents: IncidentManager::new(
                store.clone(),
                Arc::new(classifier),
                Arc::new(blobs),
                bus.clone(),
            ),
            appointments: AppointmentManager::new(store.clone(), bus.clone()),
            alerts: Alerts::new(store, bus.clone()),
            page_size: config.page_size,
        })
    }

    async fn actor(&self, uid: Option<&str>) -> anyhow::Result<UserProfile> {
        let uid = uid.context("--as <uid> is required for this command")?;
        self.users.profile(uid).await.map_err(friendly)
    }

    async fn page(&self, args: &PageArgs) -> anyhow::Result<IncidentPager> {
        let filter = IncidentFilter {
            status: args.status,
            incident_type: args.incident_type,
        };
        let mut pager = IncidentPager::new(filter, args.page_size.unwrap_or(self.page_size));
        let mut outcome = pager.first(&self.incidents).await?;

        while pager.page_number() < args.page && outcome == PageOutcome::Shown {
            let before = pager.page_number();
            outcome = pager.next(&self.incidents).await?;
            if pager.page_number() == before {
                break;
            }
        }
        if outcome == PageOutcome::FellBack || pager.page_number() < args.page {
            println!(
                "Page {} is empty; showing page {}.",
                args.page,
                pager.page_number()
            );
        }
        Ok(pager)
    }
}

fn friendly(err: AppError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

fn require(actor: &UserProfile, role: Role) -> anyhow::Result<()> {
    ensure!(
        actor.role == role,
        "{} is signed in as {}, this needs {}",
        actor.uid,
        actor.role,
        role
    );
    Ok(())
}

fn print_incident(incident: &Incident) {
    println!(
        "- {} [{}] {} by {} on {}{}",
        incident.id,
        incident.status,
        incident.incident_type,
        incident.reporter_name,
        incident.created_at.format("%Y-%m-%d %H:%M"),
        incident
            .target_student_name
            .as_deref()
            .map(|name| format!(", student {name}"))
            .unwrap_or_default()
    );
    println!("    {}", incident.transcript);
}

fn print_appointment(appointment: &Appointment) {
    println!(
        "- {} [{}] {} with {} for {} on {}",
        appointment.id,
        appointment.status,
        appointment.appointment_type,
        appointment.staff_name,
        appointment.student_name,
        appointment.scheduled_at.format("%Y-%m-%d %H:%M")
    );
    println!("    {}", appointment.notes);
}

fn incident_scope(actor: &UserProfile) -> anyhow::Result<IncidentScope> {
    Ok(match actor.role {
        Role::Admin => IncidentScope::All,
        Role::Guard => IncidentScope::ReportedBy(actor.uid.clone()),
        Role::Student => IncidentScope::Involving(actor.uid.clone()),
        Role::Parent => IncidentScope::TargetingAny(actor.children_uids.clone()),
        other => bail!("{other} accounts have no incident view"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
            return Ok(());
        }
        _ => {}
    }

    let session = match &cli.command {
        Commands::Signup { uid, .. } => Some(uid.clone()),
        _ => cli.actor.clone(),
    };
    let store: Arc<dyn Store> = Arc::new(db::PgStore::connect(pool, session).await?);
    let bus = ErrorBus::new();
    let mut failures = bus.subscribe();
    let overlay = tokio::spawn(async move {
        while let Some(failure) = failures.recv().await {
            error!(path = %failure.path, operation = %failure.operation, "{failure}");
        }
    });

    let app = App::new(&config, store, &bus)?;
    drop(bus);
    let result = run(&app, cli.actor.as_deref(), cli.command).await;

    drop(app);
    if overlay.await.is_err() {
        error!("error overlay task panicked");
    }
    result
}

async fn run(app: &App, actor: Option<&str>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::InitDb | Commands::Seed => {}
        Commands::Signup {
            uid,
            name,
            email,
            mobile,
            role,
            department,
            admin_code,
        } => {
            let profile = app
                .users
                .signup(Signup {
                    uid,
                    name,
                    email,
                    mobile_number: mobile,
                    role,
                    department,
                    admin_code,
                })
                .await
                .map_err(friendly)?;
            println!("Welcome, {} ({}).", profile.name, profile.role);
        }
        Commands::ReportIncident {
            transcript,
            student,
            location,
            voice,
            media,
        } => {
            let guard = app.actor(actor).await?;
            require(&guard, Role::Guard)?;

            let mut attachments = Vec::new();
            if let Some(path) = voice {
                attachments.push(Attachment::from_path(AttachmentKind::Voice, &path).await?);
            }
            for path in media {
                attachments.push(Attachment::from_path(AttachmentKind::Media, &path).await?);
            }

            let incident = app
                .incidents
                .report_as_guard(
                    &guard,
                    transcript,
                    student,
                    location.point(),
                    attachments,
                    |fraction| info!("uploading attachments {:.0}%", fraction * 100.0),
                )
                .await
                .map_err(friendly)?;
            println!("Incident reported as {}.", incident.incident_type);
            print_incident(&incident);
        }
        Commands::FileComplaint {
            student,
            description,
        } => {
            let reporter = app.actor(actor).await?;
            require(&reporter, Role::Student)?;
            let incident = app
                .incidents
                .file_complaint(&reporter, &student, description)
                .await
                .map_err(friendly)?;
            println!("Complaint submitted.");
            print_incident(&incident);
        }
        Commands::SetStatus { id, status, detach } => {
            let admin = app.actor(actor).await?;
            if detach {
                let write = app.incidents.set_status_detached(&admin, id, status);
                write.await.context("status update task failed")?;
                println!("Status change for {id} sent.");
            } else {
                app.incidents
                    .set_status(&admin, id, status)
                    .await
                    .map_err(friendly)?;
                println!("Incident {id} is now {status}.");
            }
        }
        Commands::AssignWellness { id } => {
            let admin = app.actor(actor).await?;
            let appointment = app
                .incidents
                .assign_wellness(&admin, id)
                .await
                .map_err(friendly)?;
            println!(
                "Wellness session assigned to {}.",
                appointment.student_name
            );
            print_appointment(&appointment);
        }
        Commands::DeleteIncident { id } => {
            let admin = app.actor(actor).await?;
            app.incidents.delete(&admin, id).await.map_err(friendly)?;
            println!("Incident {id} deleted.");
        }
        Commands::Incidents { page } => {
            let admin = app.actor(actor).await?;
            require(&admin, Role::Admin)?;
            let pager = app.page(&page).await?;
            if pager.incidents().is_empty() {
                println!("No incidents found.");
                return Ok(());
            }
            println!("Page {}:", pager.page_number());
            for incident in pager.incidents() {
                print_incident(incident);
            }
        }
        Commands::Export { page, dir } => {
            let admin = app.actor(actor).await?;
            require(&admin, Role::Admin)?;
            let pager = app.page(&page).await?;
            let path = export::write_export(&dir, pager.incidents()).map_err(friendly)?;
            println!("Exported {} incidents to {}.", pager.incidents().len(), path.display());
        }
        Commands::Watch => {
            let viewer = app.actor(actor).await?;
            if viewer.role == Role::Faculty {
                let mut live = app
                    .appointments
                    .subscribe(AppointmentScope::ForStaff(viewer.uid.clone()));
                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break,
                        snapshot = live.next() => match snapshot {
                            Some(Ok(appointments)) => {
                                println!("{} sessions:", appointments.len());
                                appointments.iter().for_each(print_appointment);
                            }
                            Some(Err(err)) => error!("{}", err.user_message()),
                            None => break,
                        },
                    }
                }
            } else {
                let mut live = app.incidents.subscribe(incident_scope(&viewer)?);
                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break,
                        snapshot = live.next() => match snapshot {
                            Some(Ok(incidents)) => {
                                println!("{} incidents:", incidents.len());
                                incidents.iter().for_each(print_incident);
                            }
                            Some(Err(err)) => error!("{}", err.user_message()),
                            None => break,
                        },
                    }
                }
            }
        }
        Commands::Book {
            staff,
            appointment_type,
            notes,
        } => {
            let student = app.actor(actor).await?;
            require(&student, Role::Student)?;
            let appointment = app
                .appointments
                .book(&student, &staff, appointment_type, &notes)
                .await
                .map_err(friendly)?;
            println!("Session requested with {}.", appointment.staff_name);
        }
        Commands::Approve { id } => {
            let staff = app.actor(actor).await?;
            let appointment = app.appointments.approve(&staff, id).await.map_err(friendly)?;
            print_appointment(&appointment);
        }
        Commands::Reschedule { id } => {
            let staff = app.actor(actor).await?;
            let appointment = app
                .appointments
                .reschedule(&staff, id)
                .await
                .map_err(friendly)?;
            print_appointment(&appointment);
        }
        Commands::Complete { id } => {
            let staff = app.actor(actor).await?;
            let appointment = app.appointments.complete(&staff, id).await.map_err(friendly)?;
            print_appointment(&appointment);
        }
        Commands::Availability { text } => {
            let staff = app.actor(actor).await?;
            app.appointments
                .set_availability(&staff, &text)
                .await
                .map_err(friendly)?;
            println!("Availability updated.");
        }
        Commands::Faculty => {
            for staff in app.appointments.faculty().await? {
                println!(
                    "- {} {}{}",
                    staff.uid,
                    staff.name,
                    staff.department
                        .as_deref()
                        .map(|d| format!(", {d}"))
                        .unwrap_or_default()
                );
                println!(
                    "    {}",
                    staff.availability.as_deref().unwrap_or("No availability published.")
                );
            }
        }
        Commands::Sessions => {
            let viewer = app.actor(actor).await?;
            let scope = match viewer.role {
                Role::Student => AppointmentScope::ForStudent(viewer.uid.clone()),
                Role::Faculty => AppointmentScope::ForStaff(viewer.uid.clone()),
                Role::Admin => AppointmentScope::ForStaff(WELLNESS_STAFF_ID.to_string()),
                other => bail!("{other} accounts have no sessions"),
            };
            let appointments = app.appointments.list(&scope).await?;
            if appointments.is_empty() {
                println!("No sessions found.");
            }
            appointments.iter().for_each(print_appointment);
        }
        Commands::Sos { location } => {
            let user = app.actor(actor).await?;
            let alert = app
                .alerts
                .raise_sos(&user, location.point())
                .await
                .map_err(friendly)?;
            println!(
                "SOS sent at ({:.4}, {:.4}). Help is on the way.",
                alert.coords.latitude, alert.coords.longitude
            );
        }
        Commands::CheckIn { name, purpose } => {
            let log = app.alerts.check_in(&name, &purpose).await.map_err(friendly)?;
            println!("Welcome, {}. You are checked in.", log.name);
        }
        Commands::Users { role } => {
            let admin = app.actor(actor).await?;
            require(&admin, Role::Admin)?;
            for user in app.users.list(role).await? {
                println!(
                    "- {} {} <{}> {}{}",
                    user.uid,
                    user.name,
                    user.email,
                    user.role,
                    user.department
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::SetRole { uid, role } => {
            let admin = app.actor(actor).await?;
            app.users.set_role(&admin, &uid, role).await.map_err(friendly)?;
            println!("{uid} is now {role}.");
        }
        Commands::DeleteUser { uid } => {
            let admin = app.actor(actor).await?;
            let caveat = app.users.delete_user(&admin, &uid).await.map_err(friendly)?;
            println!("{caveat}");
        }
        Commands::LinkChild { parent, student } => {
            let admin = app.actor(actor).await?;
            app.users
                .link_child(&admin, &parent, &student)
                .await
                .map_err(friendly)?;
            println!("{student} linked to {parent}.");
        }
        Commands::Dashboard => {
            let viewer = app.actor(actor).await?;
            dashboard(app, &viewer).await?;
        }
        Commands::Nav { role } => {
            let role = match role {
                Some(role) => role,
                None => app.actor(actor).await?.role,
            };
            for item in nav::menu(role) {
                println!("{:<32} {}", item.path, item.label);
            }
        }
        Commands::Map => {
            let admin = app.actor(actor).await?;
            require(&admin, Role::Admin)?;
            let incidents = app.incidents.list(&IncidentScope::All).await?;
            let points = report::map_points(&incidents);
            println!("{}", serde_json::to_string_pretty(&points)?);
        }
        Commands::Trends { since_days, limit } => {
            let viewer = app.actor(actor).await?;
            ensure!(
                matches!(viewer.role, Role::Faculty | Role::Admin),
                "behavioural trends are available to faculty and administrators"
            );
            let incidents = app.incidents.list(&IncidentScope::All).await?;
            let scores = trends::score_students(&incidents, since_days, Utc::now());
            if scores.is_empty() {
                println!("No incidents found for this window.");
                return Ok(());
            }
            println!("Students most affected:");
            for score in scores.iter().take(limit) {
                println!(
                    "- {} ({}) score {:.2} across {} incidents",
                    score.student_name, score.student_id, score.score, score.incident_count
                );
            }
        }
        Commands::Report { since_days, out } => {
            let admin = app.actor(actor).await?;
            require(&admin, Role::Admin)?;
            let incidents = app.incidents.list(&IncidentScope::All).await?;
            let active = app.alerts.active_sos().await?;
            let report = report::build_report(since_days, Utc::now(), &incidents, &active);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn dashboard(app: &App, viewer: &UserProfile) -> anyhow::Result<()> {
    println!("Signed in as {} ({}).", viewer.name, viewer.role);
    match viewer.role {
        Role::Admin => {
            let incidents = app.incidents.list(&IncidentScope::All).await?;
            let active = app.alerts.active_sos().await?;
            println!("Active SOS alerts: {}", active.len());
            for alert in &active {
                println!(
                    "- {} at ({:.4}, {:.4})",
                    alert.user_name, alert.coords.latitude, alert.coords.longitude
                );
            }
            for (status, count) in report::count_by_status(&incidents) {
                println!("{status}: {count}");
            }
            println!("Latest reports:");
            incidents.iter().take(5).for_each(print_incident);
        }
        Role::Student => {
            let complaints = app
                .incidents
                .list(&IncidentScope::ReportedBy(viewer.uid.clone()))
                .await?;
            println!("My complaints: {}", complaints.len());
            complaints.iter().for_each(print_incident);
            let sessions = app
                .appointments
                .list(&AppointmentScope::ForStudent(viewer.uid.clone()))
                .await?;
            println!("My sessions: {}", sessions.len());
            sessions.iter().for_each(print_appointment);
            println!("In an emergency run `sos --lat <lat> --lng <lng>`.");
        }
        Role::Guard => {
            let reports = app
                .incidents
                .list(&IncidentScope::ReportedBy(viewer.uid.clone()))
                .await?;
            println!("Past reports: {}", reports.len());
            reports.iter().for_each(print_incident);
        }
        Role::Faculty => {
            let agenda = app.appointments.agenda(&viewer.uid).await?;
            println!("Pending requests: {}", agenda.pending.len());
            agenda.pending.iter().for_each(print_appointment);
            println!("Upcoming sessions: {}", agenda.upcoming.len());
            agenda.upcoming.iter().for_each(print_appointment);
            println!("Past and rescheduled: {}", agenda.other.len());
        }
        Role::Parent => {
            let incidents = app
                .incidents
                .list(&IncidentScope::TargetingAny(viewer.children_uids.clone()))
                .await?;
            if viewer.children_uids.is_empty() {
                println!("No students are linked to this account yet.");
            } else {
                println!(
                    "Incidents involving your children: {}",
                    incidents.len()
                );
                incidents.iter().for_each(print_incident);
            }
        }
        Role::Visitor => {
            println!(
                "Visitors sign in at the gate with `check-in --name <name> --purpose <purpose>`."
            );
        }
    }
    Ok(())
}
