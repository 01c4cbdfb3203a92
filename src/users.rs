use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::events::{ErrorBus, WriteOp};
use crate::models::{Role, UserProfile};
use crate::store::{Collection, Store};

/// Shown after an administrator removes a profile.
pub const DELETE_USER_CAVEAT: &str = "The user's profile has been removed. Their login account \
must be deleted separately by an administrator of the authentication provider.";

/// Client-side role check. The data store enforces its own rules regardless.
pub fn require_role(
    actor: &UserProfile,
    role: Role,
    path: String,
    operation: WriteOp,
) -> AppResult<()> {
    if actor.role == role {
        Ok(())
    } else {
        Err(AppError::denied(path, operation))
    }
}

#[derive(Debug, Clone)]
pub struct Signup {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub role: Role,
    pub department: Option<String>,
    pub admin_code: Option<String>,
}

pub struct UserDirectory {
    store: Arc<dyn Store>,
    bus: ErrorBus,
    email_domain: String,
    admin_code: Option<String>,
}

impl UserDirectory {
    pub fn new(
        store: Arc<dyn Store>,
        bus: ErrorBus,
        email_domain: impl Into<String>,
        admin_code: Option<String>,
    ) -> Self {
        Self {
            store,
            bus,
            email_domain: email_domain.into(),
            admin_code,
        }
    }

    fn validate(&self, signup: &Signup) -> AppResult<()> {
        if signup.uid.trim().is_empty() {
            return Err(AppError::validation("uid", "A user ID is required."));
        }
        if signup.name.trim().chars().count() < 2 {
            return Err(AppError::validation("name", "Please enter your full name."));
        }
        let email = signup.email.trim();
        let well_formed = email
            .split_once('@')
            .map_or(false, |(local, host)| !local.is_empty() && host.contains('.'));
        if !well_formed {
            return Err(AppError::validation("email", "Please enter a valid email."));
        }
        if !email.ends_with(&format!("@{}", self.email_domain)) {
            return Err(AppError::validation(
                "email",
                format!("Only emails from {} are allowed.", self.email_domain),
            ));
        }
        let mobile = signup.mobile_number.trim();
        if mobile.len() != 10 || !mobile.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::validation(
                "mobile_number",
                "Mobile number must be 10 digits.",
            ));
        }
        if signup.role == Role::Parent {
            return Err(AppError::validation(
                "role",
                "Parent accounts are created by an administrator.",
            ));
        }
        if signup.role == Role::Admin {
            let accepted = match (&self.admin_code, &signup.admin_code) {
                (Some(expected), Some(given)) => expected == given,
                _ => false,
            };
            if !accepted {
                return Err(AppError::validation(
                    "admin_code",
                    "The code you entered to create an admin account is incorrect.",
                ));
            }
        }
        Ok(())
    }

    pub async fn signup(&self, signup: Signup) -> AppResult<UserProfile> {
        self.validate(&signup)?;

        let department = if signup.role == Role::Faculty {
            signup
                .department
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
        } else {
            None
        };
        let profile = UserProfile {
            uid: signup.uid.trim().to_string(),
            name: signup.name.trim().to_string(),
            email: signup.email.trim().to_string(),
            role: signup.role,
            department,
            language_preference: None,
            children_uids: Vec::new(),
            availability: None,
            mobile_number: Some(signup.mobile_number.trim().to_string()),
        };

        self.store.insert_user(&profile).await.map_err(|err| {
            if err.is_permission_denied() {
                self.bus.report(
                    err,
                    Collection::Users.doc_path(&profile.uid),
                    WriteOp::Create,
                    Some(&profile),
                )
            } else {
                err
            }
        })?;
        info!(uid = %profile.uid, role = %profile.role, "account created");
        Ok(profile)
    }

    pub async fn profile(&self, uid: &str) -> AppResult<UserProfile> {
        self.store
            .get_user(uid)
            .await?
            .ok_or_else(|| AppError::not_found("user", uid))
    }

    pub async fn list(&self, role: Option<Role>) -> AppResult<Vec<UserProfile>> {
        self.store.list_users(role).await
    }

    pub async fn set_role(&self, actor: &UserProfile, uid: &str, role: Role) -> AppResult<()> {
        let path = Collection::Users.doc_path(uid);
        let payload = serde_json::json!({ "role": role });
        let result = match require_role(actor, Role::Admin, path.clone(), WriteOp::Update) {
            Ok(()) => self.store.update_role(uid, role).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(true) => {
                info!(uid, role = %role, "role changed");
                Ok(())
            }
            Ok(false) => Err(AppError::not_found("user", uid)),
            Err(err) => Err(self.bus.report(err, path, WriteOp::Update, Some(&payload))),
        }
    }

    /// Removes the profile document only. Returns the caveat to show the administrator.
    pub async fn delete_user(&self, actor: &UserProfile, uid: &str) -> AppResult<&'static str> {
        let path = Collection::Users.doc_path(uid);
        let result = match require_role(actor, Role::Admin, path.clone(), WriteOp::Delete) {
            Ok(()) => self.store.delete_user(uid).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(true) => {
                warn!(uid, "profile deleted; authentication identity left in place");
                Ok(DELETE_USER_CAVEAT)
            }
            Ok(false) => Err(AppError::not_found("user", uid)),
            Err(err) => Err(self.bus.report::<()>(err, path, WriteOp::Delete, None)),
        }
    }

    pub async fn link_child(
        &self,
        actor: &UserProfile,
        parent_uid: &str,
        student_uid: &str,
    ) -> AppResult<()> {
        let path = Collection::Users.doc_path(parent_uid);
        require_role(actor, Role::Admin, path.clone(), WriteOp::Update)
            .map_err(|err| self.bus.report::<()>(err, path.clone(), WriteOp::Update, None))?;

        let parent = self.profile(parent_uid).await?;
        if parent.role != Role::Parent {
            return Err(AppError::validation(
                "parent",
                format!("{parent_uid} is not a parent account"),
            ));
        }
        let student = self
            .store
            .get_user(student_uid)
            .await?
            .filter(|p| p.role == Role::Student)
            .ok_or_else(|| AppError::not_found("student", student_uid))?;

        let payload = serde_json::json!({ "child": student.uid });
        let linked = self
            .store
            .add_child(parent_uid, &student.uid)
            .await
            .map_err(|err| self.bus.report(err, path.clone(), WriteOp::Update, Some(&payload)))?;
        if !linked {
            return Err(AppError::not_found("user", parent_uid));
        }
        info!(parent = parent_uid, student = %student.uid, "child linked");
        Ok(())
    }
}
