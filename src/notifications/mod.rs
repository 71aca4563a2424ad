//! Notifiers receiving the output of every scan.

pub mod webhook;

use log::debug;
use serde::Serialize;

use crate::config::ScanConfig;
use crate::error::{ConfigError, NotificationError};

const WEBHOOK_TYPE: &str = "webhook";

/// A configured notification target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notifier {
    Webhook { url: String, token: String },
}

impl Notifier {
    /// Deliver `payload` to this target.
    pub fn notify<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), NotificationError> {
        match self {
            Notifier::Webhook { url, token } => webhook::send(url, token, payload),
        }
    }
}

/// Build every notifier declared under `[notifications]`.
pub fn from_config(config: &ScanConfig) -> Result<Vec<Notifier>, ConfigError> {
    config
        .notifications
        .iter()
        .map(|(name, notifier)| match notifier.notifier_type.as_str() {
            WEBHOOK_TYPE => {
                debug!("initialized webhook notifier '{}'", name);
                Ok(Notifier::Webhook {
                    url: notifier.config.url.clone(),
                    token: notifier.config.token.clone(),
                })
            }
            other => Err(ConfigError::UnknownNotifier(other.to_string())),
        })
        .collect()
}
