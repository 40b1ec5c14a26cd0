//! Verifier registry
//!
//! Holds the channel verifiers in registration order. A record goes to the
//! first verifier whose `can_handle` accepts it; channel cardinality is small
//! enough that a linear scan is all the lookup needs.

use super::{
    ChannelVerifier, DeliveryWindow, EmailNoticeVerifier, MailNoticeVerifier, PhoneNoticeVerifier,
};
use crate::error::{VerifyError, VerifyResult};
use notices_common::config::EngineConfig;
use notices_common::db::NotificationRecord;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
pub struct VerifierRegistry {
    verifiers: Vec<Arc<dyn ChannelVerifier>>,
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry described by the configured channel table
    pub fn from_config(config: &EngineConfig) -> VerifyResult<Self> {
        let window = DeliveryWindow::new(
            config.delivery_window_before(),
            config.delivery_window_after(),
        );

        let mut registry = Self::new();
        for (name, codes) in &config.channels {
            let verifier: Arc<dyn ChannelVerifier> = match name.as_str() {
                PhoneNoticeVerifier::NAME => {
                    Arc::new(PhoneNoticeVerifier::new(codes.clone(), window))
                }
                EmailNoticeVerifier::NAME => {
                    Arc::new(EmailNoticeVerifier::new(codes.clone(), window))
                }
                MailNoticeVerifier::NAME => Arc::new(MailNoticeVerifier::new(codes.clone())),
                other => return Err(VerifyError::UnknownVerifier(other.to_string())),
            };
            registry.register(verifier)?;
        }

        Ok(registry)
    }

    /// Add a verifier; names must be unique
    ///
    /// When two verifiers claim the same code, the first registered wins.
    pub fn register(&mut self, verifier: Arc<dyn ChannelVerifier>) -> VerifyResult<()> {
        if self.get(verifier.name()).is_some() {
            return Err(VerifyError::DuplicateVerifier(verifier.name().to_string()));
        }

        for code in verifier.channel_codes() {
            if let Some(owner) = self
                .verifiers
                .iter()
                .find(|v| v.channel_codes().contains(code))
            {
                warn!(
                    "Delivery option {} already handled by '{}', '{}' will not receive it",
                    code,
                    owner.name(),
                    verifier.name()
                );
            }
        }

        debug!(
            "Registered verifier '{}' for delivery options {:?}",
            verifier.name(),
            verifier.channel_codes()
        );
        self.verifiers.push(verifier);
        Ok(())
    }

    /// Verifier responsible for a record, if any
    pub fn find(&self, record: &NotificationRecord) -> Option<&Arc<dyn ChannelVerifier>> {
        self.verifiers.iter().find(|v| v.can_handle(record))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ChannelVerifier>> {
        self.verifiers.iter().find(|v| v.name() == name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.verifiers.iter().map(|v| v.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::VerificationResult;
    use crate::store::EvidenceFeeds;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct Catchall;

    #[async_trait]
    impl ChannelVerifier for Catchall {
        fn name(&self) -> &'static str {
            "catchall"
        }

        fn channel_codes(&self) -> &[i64] {
            &[]
        }

        fn can_handle(&self, _record: &NotificationRecord) -> bool {
            true
        }

        async fn verify(
            &self,
            _record: &NotificationRecord,
            _feeds: &dyn EvidenceFeeds,
            _result: &mut VerificationResult,
        ) -> VerifyResult<()> {
            Ok(())
        }
    }

    fn record(channel: i64) -> NotificationRecord {
        let at = NaiveDate::from_ymd_opt(2025, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        NotificationRecord::new(1, "12345", 2, channel, at)
    }

    #[test]
    fn test_default_channel_table() {
        let registry = VerifierRegistry::from_config(&EngineConfig::default()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.find(&record(8)).unwrap().name(), "phone");
        assert_eq!(registry.find(&record(3)).unwrap().name(), "phone");
        assert_eq!(registry.find(&record(2)).unwrap().name(), "email");
        assert_eq!(registry.find(&record(1)).unwrap().name(), "mail");
        assert!(registry.find(&record(6)).is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = VerifierRegistry::new();
        registry.register(Arc::new(PhoneNoticeVerifier::default())).unwrap();
        let err = registry
            .register(Arc::new(PhoneNoticeVerifier::default()))
            .unwrap_err();
        assert!(matches!(err, VerifyError::DuplicateVerifier(name) if name == "phone"));
    }

    #[test]
    fn test_unknown_verifier_in_channel_table() {
        let mut config = EngineConfig::default();
        config.channels.insert("fax".to_string(), vec![6]);
        let err = VerifierRegistry::from_config(&config).err().unwrap();
        assert!(matches!(err, VerifyError::UnknownVerifier(name) if name == "fax"));
    }

    #[test]
    fn test_first_capable_verifier_wins() {
        let mut registry = VerifierRegistry::new();
        registry.register(Arc::new(MailNoticeVerifier::default())).unwrap();
        registry.register(Arc::new(Catchall)).unwrap();

        assert_eq!(registry.find(&record(1)).unwrap().name(), "mail");
        assert_eq!(registry.find(&record(9)).unwrap().name(), "catchall");
        assert_eq!(registry.names(), vec!["mail", "catchall"]);
    }
}
