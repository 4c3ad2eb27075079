//! The room booking checker
//!
//! One polling pass: log in to the portal, walk to the booking page for the
//! current session, and probe it for a booking form. The page grows a form
//! the moment the application window opens; until then it is static text.

use std::sync::{Arc, OnceLock};

use eyre::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

use smsgate::{MessageRecord, Messenger};

use crate::config::{PortalConfig, SmsConfig};
use crate::eventloop::{EventLoop, TaskId};
use crate::portal::{self, PortalClient, PortalError};

/// What one check observed
#[derive(Debug)]
pub enum CheckOutcome {
    /// The booking page has no form yet
    NotOpen,
    /// The form appeared; a notification was sent
    Notified(MessageRecord),
}

/// Periodic task that watches the booking page and notifies once
pub struct BookingChecker {
    portal: PortalClient,
    messenger: Messenger,
    portal_cfg: PortalConfig,
    sms_cfg: SmsConfig,
}

impl BookingChecker {
    pub fn new(portal_cfg: PortalConfig, sms_cfg: SmsConfig, messenger: Messenger) -> Result<Self> {
        let portal = PortalClient::new(&portal_cfg).context("Failed to build portal client")?;
        Ok(Self {
            portal,
            messenger,
            portal_cfg,
            sms_cfg,
        })
    }

    /// Run a single check
    pub async fn check_once(&mut self) -> Result<CheckOutcome> {
        let (reg_no, password) = portal::credentials(&self.portal_cfg)?;

        self.portal
            .login(
                &self.portal_cfg.login_path,
                &self.portal_cfg.reg_no_field,
                &self.portal_cfg.password_field,
                &reg_no,
                &password,
            )
            .await
            .context("portal login")?;

        self.portal
            .follow_link(&self.portal_cfg.booking_path)
            .await
            .context("opening booking page")?;

        let session_page = self
            .portal
            .follow_link(&self.portal_cfg.session_path())
            .await
            .context("opening session booking page")?;

        match portal::select_form(&session_page) {
            Ok(_) => {
                info!("booking form is up, sending notification");
                let record = self
                    .messenger
                    .send_message(&self.sms_cfg.recipient, &self.sms_cfg.body)
                    .await
                    .context("sending notification")?;
                Ok(CheckOutcome::Notified(record))
            }
            Err(PortalError::FormNotFound) => {
                debug!("booking page has no form yet");
                Ok(CheckOutcome::NotOpen)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Register this checker as a repeating task.
    ///
    /// The task retires itself after the first notification so one daemon
    /// run sends at most one SMS; the loop keeps running until stopped.
    pub fn schedule(self, ev: &mut EventLoop) -> TaskId {
        let handle = ev.handle();
        let id_slot: Arc<OnceLock<TaskId>> = Arc::new(OnceLock::new());
        let checker = Arc::new(Mutex::new(self));

        let id = ev.schedule_repeating({
            let id_slot = Arc::clone(&id_slot);
            move || {
                let handle = handle.clone();
                let id_slot = Arc::clone(&id_slot);
                let checker = Arc::clone(&checker);
                async move {
                    let mut checker = checker.lock().await;
                    if let CheckOutcome::Notified(record) = checker.check_once().await? {
                        info!(sid = %record.sid, status = %record.status, "notification sent, retiring check task");
                        if let Some(id) = id_slot.get() {
                            handle.unschedule(*id);
                        }
                    }
                    Ok(())
                }
            }
        });

        let _ = id_slot.set(id);
        id
    }
}
