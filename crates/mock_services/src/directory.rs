//! In-memory user directory with failure injection

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{Classification, Contact, ContractError, Profile, UserDirectory, UserId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{MockServiceError, Result};

/// Directory contents for the single device owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryData {
    pub classification: Classification,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl DirectoryData {
    /// Civilian "Ana Cruz" with two primary contacts and one secondary
    pub fn sample() -> Self {
        let contact = |id: &str, name: &str, relationship: &str, is_primary: bool| Contact {
            id: id.to_string(),
            name: name.to_string(),
            phone_number: format!("+63 917 555 {:04}", id.len() * 1111),
            relationship: relationship.to_string(),
            is_primary,
        };

        Self {
            classification: Classification::Civilian,
            contacts: vec![
                contact("c1", "Maria Cruz", "mother", true),
                contact("c22", "Jose Cruz", "brother", true),
                contact("c333", "Lea Santos", "friend", false),
            ],
            profile: Some(Profile {
                first_name: "Ana".to_string(),
                last_name: "Cruz".to_string(),
            }),
        }
    }

    /// Load from a JSON document
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| MockServiceError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| MockServiceError::InvalidData {
            path: display,
            line: e.line(),
            message: e.to_string(),
        })
    }
}

/// Which lookups fail, and how slow every lookup is
#[derive(Debug, Clone, Default)]
pub struct DirectoryFailures {
    pub classification: bool,
    pub contacts: bool,
    pub profile: bool,
    pub latency: Duration,
    /// Every lookup hangs without answering
    pub stalled: bool,
}

/// User directory served from memory
///
/// Returns only primary contacts, like the remote directory does.
pub struct InMemoryDirectory {
    data: Mutex<DirectoryData>,
    failures: Mutex<DirectoryFailures>,
    classification_calls: AtomicU32,
    contact_calls: AtomicU32,
    profile_calls: AtomicU32,
}

impl InMemoryDirectory {
    pub fn new(data: DirectoryData) -> Self {
        Self::with_failures(data, DirectoryFailures::default())
    }

    pub fn with_failures(data: DirectoryData, failures: DirectoryFailures) -> Self {
        Self {
            data: Mutex::new(data),
            failures: Mutex::new(failures),
            classification_calls: AtomicU32::new(0),
            contact_calls: AtomicU32::new(0),
            profile_calls: AtomicU32::new(0),
        }
    }

    /// Replace the failure injection settings
    pub fn set_failures(&self, failures: DirectoryFailures) {
        *self.failures() = failures;
    }

    pub fn set_contacts(&self, contacts: Vec<Contact>) {
        self.data().contacts = contacts;
    }

    pub fn set_classification(&self, classification: Classification) {
        self.data().classification = classification;
    }

    pub fn classification_calls(&self) -> u32 {
        self.classification_calls.load(Ordering::SeqCst)
    }

    pub fn contact_calls(&self) -> u32 {
        self.contact_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> u32 {
        self.profile_calls.load(Ordering::SeqCst)
    }

    fn data(&self) -> MutexGuard<'_, DirectoryData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failures(&self) -> MutexGuard<'_, DirectoryFailures> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulated round trip; `Err` if `fails` selects this lookup
    async fn round_trip(
        &self,
        lookup: &'static str,
        user_id: &UserId,
        fails: impl Fn(&DirectoryFailures) -> bool,
    ) -> std::result::Result<(), ContractError> {
        let (latency, fail, stalled) = {
            let failures = self.failures();
            (failures.latency, fails(&failures), failures.stalled)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(ContractError::directory(
                lookup,
                user_id.as_str(),
                "directory unreachable",
            ));
        }
        Ok(())
    }
}

impl UserDirectory for InMemoryDirectory {
    #[instrument(
        name = "mock_directory_classification",
        skip(self, user_id),
        fields(user_id = %user_id)
    )]
    async fn caller_classification(
        &self,
        user_id: &UserId,
    ) -> std::result::Result<Classification, ContractError> {
        self.classification_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip("classification", user_id, |f| f.classification)
            .await?;
        Ok(self.data().classification)
    }

    #[instrument(
        name = "mock_directory_primary_contacts",
        skip(self, user_id),
        fields(user_id = %user_id)
    )]
    async fn primary_contacts(
        &self,
        user_id: &UserId,
    ) -> std::result::Result<Vec<Contact>, ContractError> {
        self.contact_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip("primary_contacts", user_id, |f| f.contacts)
            .await?;
        Ok(self
            .data()
            .contacts
            .iter()
            .filter(|c| c.is_primary)
            .cloned()
            .collect())
    }

    #[instrument(
        name = "mock_directory_profile",
        skip(self, user_id),
        fields(user_id = %user_id)
    )]
    async fn profile(
        &self,
        user_id: &UserId,
    ) -> std::result::Result<Option<Profile>, ContractError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip("profile", user_id, |f| f.profile).await?;
        Ok(self.data().profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_only_primary_contacts_returned() {
        let directory = InMemoryDirectory::new(DirectoryData::sample());
        let contacts = directory.primary_contacts(&"civ-1".into()).await.unwrap();
        assert_eq!(contacts.len(), 2);
        assert!(contacts.iter().all(|c| c.is_primary));
        assert_eq!(directory.contact_calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let directory = InMemoryDirectory::with_failures(
            DirectoryData::sample(),
            DirectoryFailures {
                contacts: true,
                ..Default::default()
            },
        );
        let user: UserId = "civ-1".into();

        let err = directory.primary_contacts(&user).await.unwrap_err();
        assert!(err.to_string().contains("primary_contacts"));
        assert_eq!(
            directory.caller_classification(&user).await.unwrap(),
            Classification::Civilian
        );

        directory.set_failures(DirectoryFailures::default());
        assert!(directory.primary_contacts(&user).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_applies() {
        let directory = InMemoryDirectory::with_failures(
            DirectoryData::sample(),
            DirectoryFailures {
                latency: Duration::from_millis(750),
                ..Default::default()
            },
        );
        let started = tokio::time::Instant::now();
        directory.profile(&"civ-1".into()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_lookup_never_answers() {
        let directory = InMemoryDirectory::with_failures(
            DirectoryData::sample(),
            DirectoryFailures {
                stalled: true,
                ..Default::default()
            },
        );
        let lookup = tokio::time::timeout(
            Duration::from_secs(3600),
            directory.caller_classification(&"civ-1".into()),
        )
        .await;
        assert!(lookup.is_err());
        assert_eq!(directory.classification_calls(), 1);
    }

    #[test]
    fn test_load_from_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "classification": "responder",
                "contacts": [
                    {{"id": "c1", "name": "Desk Sergeant", "phone_number": "911", "is_primary": true}}
                ]
            }}"#
        )
        .unwrap();

        let data = DirectoryData::from_json_file(file.path()).unwrap();
        assert_eq!(data.classification, Classification::Responder);
        assert_eq!(data.contacts.len(), 1);
        assert_eq!(data.profile, None);
    }
}
