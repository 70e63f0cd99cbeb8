//! Trust store commands: list, delete, rebuild-registry

use anyhow::{Context, Result};
use std::io::{self, Write};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use sentinel_core::store::StoredModel;
use sentinel_core::TrustStore;

/// Table row for a known model
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "Last Verified")]
    last_verified: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Origin")]
    origin: String,
}

/// Table row for an approved file
#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "File")]
    path: String,
    #[tabled(rename = "Size")]
    size: u64,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Approved")]
    verified_at: String,
}

fn render<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

fn models_table(models: &[StoredModel]) -> String {
    let rows: Vec<ModelRow> = models
        .iter()
        .map(|model| {
            let origin = model
                .entry
                .as_ref()
                .and_then(|e| e.origin.clone())
                .or_else(|| model.metadata.origin.clone());
            let last_verified = model
                .entry
                .as_ref()
                .and_then(|e| e.last_verified)
                .or(model.metadata.last_verified);

            ModelRow {
                model: model.identity.to_string(),
                status: model
                    .entry
                    .as_ref()
                    .map(|e| e.status.to_string())
                    .unwrap_or_else(|| "unregistered".to_string()),
                files: model.metadata.approved_files.len(),
                last_verified: last_verified
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string()),
                fingerprint: model
                    .metadata
                    .model_hash
                    .as_ref()
                    .map(|fp| fp.short().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                origin: origin.unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect();

    render(&rows)
}

fn files_table(models: &[StoredModel]) -> String {
    let rows: Vec<FileRow> = models
        .iter()
        .flat_map(|model| {
            model.metadata.approved_files.iter().map(|file| FileRow {
                model: model.identity.to_string(),
                path: file.path.clone(),
                size: file.size,
                fingerprint: file.fingerprint.short().to_string(),
                verified_at: file
                    .verified_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            })
        })
        .collect();

    render(&rows)
}

/// `model-sentinel list`
pub fn execute_list(store: &TrustStore, files: bool) -> Result<()> {
    let models = store.list_models().context("Failed to read trust store")?;

    if models.is_empty() {
        println!("ℹ️  No models in trust store at {}", store.location());
        return Ok(());
    }

    println!("📦 Trust store: {}\n", store.location());
    if files {
        println!("{}", files_table(&models));
    } else {
        println!("{}", models_table(&models));
    }
    Ok(())
}

/// `model-sentinel delete`
pub fn execute_delete(store: &TrustStore, force: bool) -> Result<()> {
    if !force {
        println!(
            "⚠️  This will delete the trust store at {}.",
            store.location()
        );
        println!("   Every file approval will be lost.");
        print!("Continue? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled");
            return Ok(());
        }
    }

    store.wipe().context("Failed to delete trust store")?;
    println!("🗑️  Trust store deleted");
    Ok(())
}

/// `model-sentinel rebuild-registry`
pub fn execute_rebuild(store: &TrustStore) -> Result<()> {
    let registry = store
        .rebuild_registry()
        .context("Failed to rebuild registry")?;
    println!("✅ Registry rebuilt with {} model(s)", registry.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::store::{FileRecord, ModelMetadata, RegistryStatus};
    use sentinel_core::{Fingerprint, ModelIdentity};
    use tempfile::TempDir;

    fn populated_store(root: &std::path::Path) -> TrustStore {
        let store = TrustStore::open(root);
        let model = ModelIdentity::hub("org/model", "main");

        let mut metadata = ModelMetadata::empty();
        metadata.approved_files.push(FileRecord {
            path: "modeling.py".to_string(),
            fingerprint: Fingerprint::new("ab".repeat(32)),
            size: 42,
            verified_at: None,
        });
        metadata.promote(Fingerprint::new("cd".repeat(32)), chrono::Utc::now());

        store.ensure_layout().unwrap();
        store.save_metadata(&model, &metadata).unwrap();
        store
            .register(&model, RegistryStatus::Verified, None)
            .unwrap();
        store
    }

    #[test]
    fn test_models_table_shows_registry_state() {
        let temp = TempDir::new().unwrap();
        let store = populated_store(temp.path());

        let table = models_table(&store.list_models().unwrap());
        assert!(table.contains("hf/org/model@main"));
        assert!(table.contains("verified"));
        assert!(table.contains(&"cd".repeat(8)));
    }

    #[test]
    fn test_files_table_lists_approved_files() {
        let temp = TempDir::new().unwrap();
        let store = populated_store(temp.path());

        let table = files_table(&store.list_models().unwrap());
        assert!(table.contains("modeling.py"));
        assert!(table.contains("42"));
        assert!(table.contains("unknown"));
    }

    #[test]
    fn test_unregistered_area_is_still_listed() {
        let temp = TempDir::new().unwrap();
        let store = TrustStore::open(temp.path());
        let model = ModelIdentity::hub("org/orphan", "main");
        store.save_metadata(&model, &ModelMetadata::empty()).unwrap();

        let table = models_table(&store.list_models().unwrap());
        assert!(table.contains("hf/org/orphan@main"));
        assert!(table.contains("unregistered"));
        assert!(table.contains("never"));
    }

    #[test]
    fn test_forced_delete_then_rebuild() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("store");
        let store = populated_store(&root);

        execute_delete(&store, true).unwrap();
        assert!(!root.exists());

        execute_rebuild(&store).unwrap();
        assert!(store.load_registry().unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_restores_lost_registry() {
        let temp = TempDir::new().unwrap();
        let store = populated_store(temp.path());
        std::fs::remove_file(temp.path().join("registry.json")).unwrap();

        execute_rebuild(&store).unwrap();
        assert_eq!(store.load_registry().unwrap().len(), 1);
    }
}
