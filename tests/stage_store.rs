use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stage_extract::stage::{RemoveOutcome, Stage, StageBackend, StageStore, StagedFile};
use stage_extract::{ExtractError, ExtractResult};

/// In-memory stages with a scripted removal error and optional name suffix on upload.
#[derive(Default)]
struct MemoryBackend {
    files: Mutex<HashMap<(Stage, String), Vec<u8>>>,
    remove_error: Option<String>,
    stored_suffix: Option<&'static str>,
}

impl MemoryBackend {
    fn refusing_removal(message: &str) -> Self {
        Self {
            remove_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn seed(&self, stage: Stage, name: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert((stage, name.to_string()), bytes.to_vec());
    }

    fn holds(&self, stage: Stage, name: &str) -> bool {
        self.files
            .lock()
            .unwrap()
            .contains_key(&(stage, name.to_string()))
    }
}

impl StageBackend for MemoryBackend {
    fn put(&self, stage: Stage, filename: &str, bytes: &[u8]) -> ExtractResult<()> {
        let name = format!("{filename}{}", self.stored_suffix.unwrap_or(""));
        self.seed(stage, &name, bytes);
        Ok(())
    }

    fn get(&self, stage: Stage, filename: &str) -> ExtractResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&(stage, filename.to_string()))
            .cloned()
            .ok_or_else(|| ExtractError::NotFound {
                stage: stage.name().to_string(),
                filename: filename.to_string(),
            })
    }

    fn list(&self, stage: Stage, _pattern: Option<&str>) -> ExtractResult<Vec<StagedFile>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|((s, _), _)| *s == stage)
            .map(|((_, name), bytes)| StagedFile {
                stage,
                name: format!("{}/{name}", stage.name().to_ascii_lowercase()),
                size: bytes.len() as u64,
                md5: None,
                last_modified: None,
            })
            .collect())
    }

    fn remove(&self, stage: Stage, filename: &str) -> ExtractResult<()> {
        if let Some(message) = &self.remove_error {
            return Err(ExtractError::sql(format!("REMOVE @{stage}/{filename}"), message.clone()));
        }
        self.files
            .lock()
            .unwrap()
            .remove(&(stage, filename.to_string()));
        Ok(())
    }
}

#[test]
fn listing_strips_path_prefixes() {
    let backend = Arc::new(MemoryBackend::default());
    backend.seed(Stage::Raw, "a.csv", b"abc");
    let store = StageStore::new(backend);

    let files = store.list(Stage::Raw).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "a.csv");
    assert_eq!(files[0].size, 3);
    assert!(store.contains(Stage::Raw, "a.csv").unwrap());
    assert!(!store.contains(Stage::Completed, "a.csv").unwrap());
}

#[test]
fn restricted_removal_keeps_the_file() {
    let backend = Arc::new(MemoryBackend::refusing_removal(
        "Unsupported statement type 'REMOVE_FILES'",
    ));
    backend.seed(Stage::Raw, "a.csv", b"abc");
    let store = StageStore::new(Arc::clone(&backend) as Arc<dyn StageBackend>);

    let outcome = store.remove(Stage::Raw, "a.csv").unwrap();
    assert!(matches!(outcome, RemoveOutcome::Restricted(_)));

    let message = store.delete(Stage::Raw, "a.csv").unwrap();
    assert_eq!(
        message,
        "Note: File 'a.csv' marked as processed. File remains in RAW_STAGE due to platform security restrictions. Remove it manually if needed."
    );
    assert!(backend.holds(Stage::Raw, "a.csv"));
}

#[test]
fn move_tolerates_a_leftover_source() {
    let backend = Arc::new(MemoryBackend::refusing_removal("network hiccup"));
    backend.seed(Stage::Processing, "a.csv", b"abc");
    let store = StageStore::new(Arc::clone(&backend) as Arc<dyn StageBackend>);

    let message = store
        .move_file("a.csv", Stage::Processing, Stage::Completed)
        .unwrap();
    assert_eq!(message, "File moved from PROCESSING_STAGE to COMPLETED_STAGE");
    assert!(backend.holds(Stage::Completed, "a.csv"));
    assert!(backend.holds(Stage::Processing, "a.csv"));

    // a plain delete still surfaces the error
    assert!(store.delete(Stage::Processing, "a.csv").is_err());
}

#[test]
fn move_of_missing_file_fails() {
    let store = StageStore::new(Arc::new(MemoryBackend::default()));
    let err = store
        .move_file("gone.csv", Stage::Raw, Stage::Processing)
        .unwrap_err();
    assert_eq!(err.to_string(), "File gone.csv not found in RAW_STAGE");
}

#[test]
fn renamed_upload_is_reported() {
    let backend = Arc::new(MemoryBackend {
        stored_suffix: Some(".gz"),
        ..MemoryBackend::default()
    });
    let store = StageStore::new(backend);

    let receipt = store.upload(Stage::Raw, "a.csv", b"abc").unwrap();
    assert!(receipt.renamed);
    assert_eq!(receipt.stored_name, "a.csv.gz");
    assert_eq!(receipt.message, "File uploaded to RAW_STAGE as a.csv.gz");
}

#[test]
fn unsafe_names_never_reach_the_backend() {
    let backend = Arc::new(MemoryBackend::default());
    let store = StageStore::new(Arc::clone(&backend) as Arc<dyn StageBackend>);

    assert!(store.upload(Stage::Raw, "x'; DROP TABLE t; --.csv", b"1").is_err());
    assert!(backend.files.lock().unwrap().is_empty());
}
