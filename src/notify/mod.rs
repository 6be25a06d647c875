//! Notification trigger and sink abstraction.
//!
//! The pipeline hands qualifying sightings to a `Notifier`, which forwards a
//! `Notification` to the configured `NotificationSink`. Delivery is
//! fire-and-forget: failures are logged and dropped, never retried and never
//! returned to the pipeline.

mod sinks;

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::color::ColorLabel;
use crate::config::{NotifyBackend, NotifySettings};

pub use sinks::{EmailSink, LogSink, SmsSink, WebhookSink};

/// Payload sent to every sink: `{ "message": "..." }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
}

impl Notification {
    pub fn for_label(label: ColorLabel) -> Self {
        Self {
            message: format!("Detected a person wearing {}.", label),
        }
    }
}

/// Outbound notification transport.
pub trait NotificationSink: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Deliver one notification. Non-success responses are errors.
    fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Build the sink selected by configuration. `None` disables notifications.
pub fn build_sink(settings: &NotifySettings) -> Result<Option<Arc<dyn NotificationSink>>> {
    let sink: Arc<dyn NotificationSink> = match settings.backend {
        NotifyBackend::None => return Ok(None),
        NotifyBackend::Log => Arc::new(LogSink),
        NotifyBackend::Webhook => Arc::new(WebhookSink::new(
            settings
                .url
                .clone()
                .ok_or_else(|| anyhow!("webhook notifications require a url"))?,
            settings.timeout,
        )),
        NotifyBackend::Email => Arc::new(EmailSink::from_settings(settings)?),
        NotifyBackend::Sms => Arc::new(SmsSink::from_settings(settings)?),
    };
    Ok(Some(sink))
}

enum Dispatch {
    Disabled,
    Inline(Arc<dyn NotificationSink>),
    Background {
        tx: Mutex<Option<Sender<Notification>>>,
        worker: Option<JoinHandle<()>>,
    },
}

/// Emits notifications for newly seen people with a qualifying colour.
pub struct Notifier {
    dispatch: Dispatch,
}

impl Notifier {
    /// Notifier that never sends anything.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::Disabled,
        }
    }

    /// Deliver on the caller's thread. Failures are still swallowed.
    pub fn inline(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            dispatch: Dispatch::Inline(sink),
        }
    }

    /// Deliver on a dedicated worker thread so callers never wait on I/O.
    pub fn background(sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Notification>();
        let worker = std::thread::Builder::new()
            .name("notify".to_string())
            .spawn(move || {
                for notification in rx {
                    deliver_logged(sink.as_ref(), &notification);
                }
            })
            .map_err(|e| anyhow!("failed to spawn notification worker: {}", e))?;
        Ok(Self {
            dispatch: Dispatch::Background {
                tx: Mutex::new(Some(tx)),
                worker: Some(worker),
            },
        })
    }

    /// Background notifier for the configured sink, or a disabled one.
    pub fn from_settings(settings: &NotifySettings) -> Result<Self> {
        match build_sink(settings)? {
            Some(sink) => {
                log::info!("notifications via {} sink", sink.name());
                Self::background(sink)
            }
            None => {
                log::info!("notifications disabled");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.dispatch, Dispatch::Disabled)
    }

    /// Issue a notification when `label` qualifies. Returns whether one was issued.
    pub fn notify(&self, label: ColorLabel) -> bool {
        if !label.is_qualifying() {
            return false;
        }
        let notification = Notification::for_label(label);
        match &self.dispatch {
            Dispatch::Disabled => false,
            Dispatch::Inline(sink) => {
                deliver_logged(sink.as_ref(), &notification);
                true
            }
            Dispatch::Background { tx, .. } => {
                let sent = match tx.lock() {
                    Ok(guard) => match guard.as_ref() {
                        Some(tx) => tx.send(notification).is_ok(),
                        None => false,
                    },
                    Err(_) => false,
                };
                if !sent {
                    log::warn!("notification worker is gone; dropping {} sighting", label);
                }
                sent
            }
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if let Dispatch::Background { tx, worker } = &mut self.dispatch {
            // Closing the channel lets the worker drain what is queued and exit.
            if let Ok(mut guard) = tx.lock() {
                guard.take();
            }
            if let Some(worker) = worker.take() {
                if worker.join().is_err() {
                    log::error!("notification worker panicked");
                }
            }
        }
    }
}

fn deliver_logged(sink: &dyn NotificationSink, notification: &Notification) {
    match sink.deliver(notification) {
        Ok(()) => log::info!("notification sent via {}: {}", sink.name(), notification.message),
        Err(err) => log::warn!("notification via {} failed: {:#}", sink.name(), err),
    }
}
