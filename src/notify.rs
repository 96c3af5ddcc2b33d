//! The notification sink.
//!
//! Delivery is strictly fire-and-forget over an SNS topic: the publish runs
//! on its own task after the triggering transaction has committed, and a
//! delivery failure is logged but can never roll the business operation
//! back.

use aws_config::SdkConfig;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sns::{Client as SnsClient, Credentials, Region};
use rocket::{
    fairing::{Fairing, Info, Kind},
    tokio, Build, Rocket,
};
use serde::Deserialize;

use crate::model::common::Track;

/// Events emitted to external subscribers (applicants and commissioners).
#[derive(Debug, Clone)]
pub enum Notification {
    NominationSubmitted {
        applicant: String,
        position: String,
        track: Track,
    },
    NominationScrutinized {
        applicant: String,
        position: String,
        approved: bool,
    },
    NominationWithdrawn {
        applicant: String,
        position: String,
        track: Track,
    },
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        match self {
            Notification::NominationSubmitted { .. } => "Nomination submitted",
            Notification::NominationScrutinized { .. } => "Nomination scrutinized",
            Notification::NominationWithdrawn { .. } => "Nomination withdrawn",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::NominationSubmitted {
                applicant,
                position,
                track,
            } => format!(
                "{applicant} has submitted a nomination for {position} ({track} track). \
                 It is now awaiting scrutiny."
            ),
            Notification::NominationScrutinized {
                applicant,
                position,
                approved: true,
            } => format!("The nomination of {applicant} for {position} has been approved."),
            Notification::NominationScrutinized {
                applicant,
                position,
                approved: false,
            } => format!("The nomination of {applicant} for {position} has been rejected."),
            Notification::NominationWithdrawn {
                applicant,
                position,
                track,
            } => format!(
                "{applicant} has withdrawn their nomination for {position} ({track} track)."
            ),
        }
    }
}

/// Handle on the notification sink. The disabled variant (used in tests and
/// when no AWS config is present) only logs.
pub struct Notifier {
    inner: Option<(SnsClient, String)>,
}

impl Notifier {
    pub fn new(client: SnsClient, topic_arn: String) -> Self {
        Self {
            inner: Some((client, topic_arn)),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Emit a notification without awaiting delivery.
    pub fn send(&self, notification: Notification) {
        let (client, topic_arn) = match &self.inner {
            Some((client, topic_arn)) => (client.clone(), topic_arn.clone()),
            None => {
                debug!("Notification sink disabled: {}", notification.subject());
                return;
            }
        };
        tokio::spawn(async move {
            let result = client
                .publish()
                .topic_arn(topic_arn)
                .subject(notification.subject())
                .message(notification.message())
                .send()
                .await;
            if let Err(err) = result {
                warn!("Failed to deliver {:?}: {err}", notification.subject());
            }
        });
    }
}

/// Configuration for the notification sink.
#[derive(Deserialize)]
struct NotifyConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    sns_topic_arn: String,
    // secrets
    aws_secret_access_key: String,
}

/// A fairing that loads the AWS config and places a [`Notifier`] into
/// managed state.
pub struct NotifierFairing;

#[rocket::async_trait]
impl Fairing for NotifierFairing {
    fn info(&self) -> Info {
        Info {
            name: "Notifications",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<NotifyConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load notification config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the connection.
        let aws_config = SdkConfig::builder()
            .region(Region::new(config.aws_region))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                config.aws_access_key_id,
                config.aws_secret_access_key,
                None,
                None,
                "rocket config",
            )))
            .build();
        let client = SnsClient::new(&aws_config);
        info!("Loaded Amazon SNS config");

        // Manage the state.
        rocket = rocket.manage(Notifier::new(client, config.sns_topic_arn));
        Ok(rocket)
    }
}
