//! Append-only records: SOS alerts and the visitor guest log.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::events::{ErrorBus, WriteOp};
use crate::models::{GeoPoint, GuestLog, SosAlert, UserProfile};
use crate::store::{Collection, Store};

pub struct Alerts {
    store: Arc<dyn Store>,
    bus: ErrorBus,
}

impl Alerts {
    pub fn new(store: Arc<dyn Store>, bus: ErrorBus) -> Self {
        Self { store, bus }
    }

    /// Sends the caller's position to security. Unlike incidents, an SOS needs a real location.
    pub async fn raise_sos(
        &self,
        user: &UserProfile,
        coords: Option<GeoPoint>,
    ) -> AppResult<SosAlert> {
        let coords = coords.ok_or_else(|| {
            AppError::validation(
                "location",
                "Please ensure location services are enabled for this site.",
            )
        })?;
        let alert = self
            .store
            .insert_sos(&user.uid, &user.name, coords)
            .await
            .map_err(|err| {
                self.bus.report(
                    err,
                    Collection::SosAlerts.as_str(),
                    WriteOp::Create,
                    Some(&coords),
                )
            })?;
        warn!(uid = %user.uid, lat = coords.latitude, lng = coords.longitude, "SOS alert raised");
        Ok(alert)
    }

    pub async fn active_sos(&self) -> AppResult<Vec<SosAlert>> {
        self.store.active_sos().await
    }

    pub async fn check_in(&self, name: &str, purpose: &str) -> AppResult<GuestLog> {
        let name = name.trim();
        let purpose = purpose.trim();
        if name.chars().count() < 2 {
            return Err(AppError::validation("name", "Please enter your full name."));
        }
        if purpose.chars().count() < 10 {
            return Err(AppError::validation(
                "purpose",
                "Please describe the purpose of your visit.",
            ));
        }
        let payload = serde_json::json!({ "name": name, "purpose": purpose });
        let log = self
            .store
            .insert_guest_log(name, purpose)
            .await
            .map_err(|err| {
                self.bus.report(
                    err,
                    Collection::GuestLogs.as_str(),
                    WriteOp::Create,
                    Some(&payload),
                )
            })?;
        info!(guest = %log.id, "visitor checked in");
        Ok(log)
    }
}
