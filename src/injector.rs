use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::db::DocumentStore;
use crate::document::DocumentId;
use crate::error::{InjectError, StoreError};
use crate::parser::{self, mapper::Provenance, mapper::TargetWrite};
use crate::settings::RunConfig;
use crate::source::{collection_from_path, ModelFile, ModelFileSource};

/// What happened to one model file.
#[derive(Debug)]
pub enum FileOutcome {
    Pushed { writes: usize, warnings: usize },
    Failed(InjectError),
}

/// Totals for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub writes: usize,
    pub warnings: usize,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Pushed { writes, warnings } => {
                self.succeeded += 1;
                self.writes += writes;
                self.warnings += warnings;
            }
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn print(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Total files processed: {}", self.files);
        println!("Successful:            {}", self.succeeded);
        println!("Errors:                {}", self.failed);
        println!(
            "Documents {}: {}",
            if self.dry_run { "planned" } else { "written" },
            self.writes
        );
        if self.warnings > 0 {
            println!("Date warnings:         {}", self.warnings);
        }
        if self.dry_run {
            println!("\n[DRY RUN] Nothing was written. Remove --dry-run to push data.");
        }
    }
}

/// Runs model files against a store, one file at a time.
pub struct Injector<'a> {
    config: &'a RunConfig,
    store: &'a mut dyn DocumentStore,
    provenance: Provenance,
}

impl<'a> Injector<'a> {
    pub fn new(config: &'a RunConfig, store: &'a mut dyn DocumentStore) -> Self {
        let provenance = Provenance::new(config.actor_id.clone());
        Injector {
            config,
            store,
            provenance,
        }
    }

    /// Fixed provenance, for reproducible output.
    #[allow(dead_code)]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Process every file the source discovers. Only discovery failure is
    /// an error; per-file problems are counted in the summary.
    pub fn run(&mut self, source: &dyn ModelFileSource) -> Result<RunSummary, InjectError> {
        let paths = source.discover()?;
        let mut summary = RunSummary {
            files: paths.len(),
            dry_run: self.config.dry_run,
            ..Default::default()
        };
        if paths.is_empty() {
            return Ok(summary);
        }

        let pb = ProgressBar::new(paths.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }

        for path in &paths {
            pb.set_message(path.display().to_string());
            let outcome = self.process_path(source, path);
            if let FileOutcome::Failed(e) = &outcome {
                pb.suspend(|| error!("{}", e));
            }
            summary.record(&outcome);
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            "Processed {} files ({} ok, {} errors)",
            summary.files, summary.succeeded, summary.failed
        );
        Ok(summary)
    }

    fn process_path(&mut self, source: &dyn ModelFileSource, path: &Path) -> FileOutcome {
        match source.load(path) {
            Ok(file) => self.process_file(&file),
            Err(e) => FileOutcome::Failed(e),
        }
    }

    /// Parse, map and write one file. Shared-entity writes always go first.
    pub fn process_file(&mut self, file: &ModelFile) -> FileOutcome {
        let default_collection = collection_from_path(&file.relative);
        let root = self.config.root_collection();

        let (model, mapped) =
            match parser::process_model(&file.raw, &default_collection, &root, &self.provenance) {
                Ok(parsed) => parsed,
                Err(source) => {
                    return FileOutcome::Failed(InjectError::MalformedInput {
                        path: file.path.clone(),
                        source,
                    })
                }
            };

        info!(
            file = %file.relative.display(),
            collection = %model.collection_name,
            document = %model.document_id,
            fields = model.payload.len(),
            shared = model.shared_entities.len(),
            nested = model.nested_collections.len(),
            "parsed model"
        );
        for entity in &model.shared_entities {
            info!("Shared data detected: {} -> {}", entity.name, entity.target_path);
            debug!(entity = %entity.name, fields = ?entity.fields, "shared field filter");
        }
        for w in &mapped.warnings {
            warn!(
                file = %file.relative.display(),
                field = %w.field,
                value = %w.raw,
                "could not parse date, keeping text"
            );
        }

        let (shared, page): (Vec<&TargetWrite>, Vec<&TargetWrite>) =
            mapped.writes.iter().partition(|w| w.is_shared());

        let mut written = 0;
        for write in shared.into_iter().chain(page) {
            if let Err(e) = self.execute(write) {
                return FileOutcome::Failed(e);
            }
            written += 1;
        }

        FileOutcome::Pushed {
            writes: written,
            warnings: mapped.warnings.len(),
        }
    }

    /// What a dry run reports for `write`; only reads the store.
    fn dry_run_verb(&self, write: &TargetWrite) -> Result<&'static str, StoreError> {
        Ok(match (&write.document_id, write.merge) {
            (_, true) => "merge into",
            (DocumentId::Generated, false) => "create",
            (DocumentId::Fixed(id), false) => {
                if self.store.exists(&write.collection, id)? {
                    "replace"
                } else {
                    "create"
                }
            }
        })
    }

    fn execute(&mut self, write: &TargetWrite) -> Result<(), InjectError> {
        let store_err = |source: StoreError| InjectError::Store {
            target: write.to_string(),
            source,
        };

        if self.config.dry_run {
            let verb = self.dry_run_verb(write).map_err(store_err)?;
            info!("[DRY RUN] would {} {} ({} fields)", verb, write, write.data.len());
            if self.config.verbose {
                let body = serde_json::to_string_pretty(&write.data).unwrap_or_default();
                println!("--- {}\n{}", write, body);
            }
            return Ok(());
        }

        let id = match &write.document_id {
            DocumentId::Fixed(id) => id.clone(),
            DocumentId::Generated => self
                .store
                .new_document_id(&write.collection)
                .map_err(store_err)?,
        };
        self.store
            .write(&write.collection, &id, &write.data, write.merge)
            .map_err(store_err)?;
        debug!("wrote {}/{}", write.collection_path(), id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::document::Document;
    use crate::parser::mapper::SOURCE_MARKER;
    use crate::source::FsModelSource;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;

    fn run_config(dry_run: bool) -> RunConfig {
        RunConfig {
            domain_id: "demo".into(),
            project_id: "acme".into(),
            actor_id: "user-1".into(),
            dry_run,
            verbose: false,
        }
    }

    fn provenance() -> Provenance {
        Provenance {
            injected_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            injected_by: "user-1".into(),
            source: SOURCE_MARKER.into(),
        }
    }

    fn app_tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (rel, body) in files {
            let p = dir.path().join(rel);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, body).unwrap();
        }
        dir
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap()
    }

    fn model_file(relative: &str, body: serde_json::Value) -> ModelFile {
        ModelFile {
            path: PathBuf::from("app").join(relative),
            relative: PathBuf::from(relative),
            raw: body.to_string().into_bytes(),
        }
    }

    /// Accepts writes until `reject` matches the collection path.
    #[derive(Default)]
    struct RejectingStore {
        inner: MemoryStore,
        reject: String,
        attempts: Vec<String>,
    }

    impl DocumentStore for RejectingStore {
        fn write(
            &mut self,
            collection: &[String],
            id: &str,
            data: &Document,
            merge: bool,
        ) -> Result<(), StoreError> {
            let path = collection.join("/");
            self.attempts.push(format!("{}/{}", path, id));
            if path == self.reject {
                return Err(StoreError::Rejected("permission denied".into()));
            }
            self.inner.write(collection, id, data, merge)
        }

        fn exists(&self, collection: &[String], id: &str) -> Result<bool, StoreError> {
            self.inner.exists(collection, id)
        }
    }

    #[test]
    fn full_run_over_app_tree() {
        let dashboard = fixture("dashboard");
        let detail = fixture("client_detail");
        let dir = app_tree(&[
            ("dashboard/1_model.json", dashboard.as_str()),
            ("client_detail/1_model.json", detail.as_str()),
            ("settings/1_model.json", r#"{"theme": "dark"}"#),
        ]);
        let config = run_config(false);
        let mut store = MemoryStore::default();
        let summary = Injector::new(&config, &mut store)
            .with_provenance(provenance())
            .run(&FsModelSource::new(dir.path()))
            .unwrap();

        assert_eq!(
            summary,
            RunSummary {
                files: 3,
                succeeded: 3,
                failed: 0,
                writes: 5,
                warnings: 1,
                dry_run: false,
            }
        );
        assert!(summary.is_success());

        let org = store.get("project-demo/_shared/organizations", "main").unwrap();
        assert_eq!(org["companyName"].as_json(), Some(&json!("Northwind Installations")));
        assert_eq!(store.ids_in("clients"), vec!["c-100", "c-200"]);
        assert!(store.get("clients", "c-100").unwrap().get("id").is_none());
        assert!(store.get("client-detail", "c-100").is_some());
        assert_eq!(
            store.get("settings", "main").unwrap()["theme"].as_json(),
            Some(&json!("dark"))
        );
    }

    #[test]
    fn rerun_is_idempotent() {
        let dashboard = fixture("dashboard");
        let dir = app_tree(&[("dashboard/1_model.json", dashboard.as_str())]);
        let config = run_config(false);
        let mut store = MemoryStore::default();
        let source = FsModelSource::new(dir.path());

        Injector::new(&config, &mut store).run(&source).unwrap();
        let first = store.len();
        Injector::new(&config, &mut store).run(&source).unwrap();
        assert_eq!(store.len(), first);
        assert_eq!(store.ids_in("clients"), vec!["c-100", "c-200"]);
    }

    #[test]
    fn generated_ids_come_from_the_store() {
        let config = run_config(false);
        let mut store = MemoryStore::default();
        let outcome = Injector::new(&config, &mut store).process_file(&model_file(
            "layouts/1_model.json",
            json!({"layouts": [{"title": "a"}, {"title": "b"}]}),
        ));
        assert!(matches!(outcome, FileOutcome::Pushed { writes: 2, .. }));
        let ids = store.ids_in("layouts");
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| id.len() == 20));
    }

    #[test]
    fn bad_files_are_counted_and_run_continues() {
        let dir = app_tree(&[
            ("a/1_model.json", "{ not json"),
            ("b/1_model.json", r#"{"_metadata": {"collectionName": ""}}"#),
            ("c/1_model.json", r#"{"ok": true}"#),
        ]);
        let config = run_config(false);
        let mut store = MemoryStore::default();
        let summary = Injector::new(&config, &mut store)
            .run(&FsModelSource::new(dir.path()))
            .unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded, 1);
        assert!(!summary.is_success());
        assert!(store.get("c", "main").is_some());
    }

    #[test]
    fn store_error_stops_only_that_file() {
        let config = run_config(false);
        let mut store = RejectingStore {
            reject: "project-demo/_shared/orgs".into(),
            ..Default::default()
        };
        let mut injector = Injector::new(&config, &mut store);

        let failed = injector.process_file(&model_file(
            "home/1_model.json",
            json!({
                "name": "X",
                "title": "Home",
                "_metadata": {"sharedData": {"org": {"collection": "_shared/orgs", "fields": ["name"]}}}
            }),
        ));
        assert!(matches!(
            failed,
            FileOutcome::Failed(InjectError::Store { ref target, .. }) if target == "project-demo/_shared/orgs/main"
        ));

        let ok = injector.process_file(&model_file("about/1_model.json", json!({"title": "About"})));
        assert!(matches!(ok, FileOutcome::Pushed { writes: 1, .. }));

        // the page write after the rejected shared write was never attempted
        assert_eq!(
            store.attempts,
            vec!["project-demo/_shared/orgs/main", "about/main"]
        );
    }

    #[test]
    fn array_write_failure_aborts_remaining_items() {
        let config = run_config(false);
        let mut store = RejectingStore {
            reject: "clients".into(),
            ..Default::default()
        };
        let outcome = Injector::new(&config, &mut store).process_file(&model_file(
            "clients/1_model.json",
            json!({"clients": [{"id": "c1"}, {"id": "c2"}]}),
        ));
        assert!(matches!(outcome, FileOutcome::Failed(InjectError::Store { .. })));
        assert_eq!(store.attempts, vec!["clients/c1"]);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dashboard = fixture("dashboard");
        let dir = app_tree(&[("dashboard/1_model.json", dashboard.as_str())]);
        let config = run_config(true);
        let mut store = MemoryStore::default();
        let summary = Injector::new(&config, &mut store)
            .run(&FsModelSource::new(dir.path()))
            .unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.writes, 3);
        assert!(store.is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn dry_run_checks_existing_documents_without_writing() {
        let mut store = MemoryStore::default();
        let existing = crate::document::document_from_json(
            json!({"name": "Old"}).as_object().unwrap(),
        );
        store
            .write(&["clients".to_string()], "c1", &existing, false)
            .unwrap();

        let config = run_config(true);
        let outcome = Injector::new(&config, &mut store).process_file(&model_file(
            "clients/1_model.json",
            json!({"clients": [{"id": "c1", "name": "New"}, {"id": "c2"}]}),
        ));
        assert!(matches!(outcome, FileOutcome::Pushed { writes: 2, .. }));
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.ids_in("clients"), vec!["c1"]);
        assert_eq!(store.get("clients", "c1"), Some(&existing));
    }

    #[test]
    fn dry_run_verbs() {
        let mut store = MemoryStore::default();
        store
            .write(&["clients".to_string()], "c1", &Document::new(), false)
            .unwrap();
        let write = |id: DocumentId, merge: bool| TargetWrite {
            collection: vec!["clients".to_string()],
            document_id: id,
            data: Document::new(),
            merge,
            kind: crate::parser::mapper::WriteKind::Page,
        };

        let config = run_config(true);
        let injector = Injector::new(&config, &mut store);
        assert_eq!(
            injector.dry_run_verb(&write(DocumentId::fixed("c1"), false)).unwrap(),
            "replace"
        );
        assert_eq!(
            injector.dry_run_verb(&write(DocumentId::fixed("c9"), false)).unwrap(),
            "create"
        );
        assert_eq!(
            injector.dry_run_verb(&write(DocumentId::Generated, false)).unwrap(),
            "create"
        );
        assert_eq!(
            injector.dry_run_verb(&write(DocumentId::fixed("c1"), true)).unwrap(),
            "merge into"
        );
    }

    #[test]
    fn empty_app_dir_is_success() {
        let dir = app_tree(&[("dashboard/readme.json", "{}")]);
        let config = run_config(false);
        let mut store = MemoryStore::default();
        let summary = Injector::new(&config, &mut store)
            .run(&FsModelSource::new(dir.path()))
            .unwrap();
        assert_eq!(summary.files, 0);
        assert!(summary.is_success());
    }

    #[test]
    fn missing_app_dir_is_fatal() {
        let config = run_config(false);
        let mut store = MemoryStore::default();
        let err = Injector::new(&config, &mut store)
            .run(&FsModelSource::new(Path::new("/definitely/not/here")))
            .unwrap_err();
        assert!(matches!(err, InjectError::RootUnreadable { .. }));
    }
}
