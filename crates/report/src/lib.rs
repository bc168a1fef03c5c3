use anyhow::{Context, Result};
use mediakeep_core::{
    now_utc_rfc3339, BackupGap, CatalogSnapshot, ProjectRecord, ProjectView, ValidationErrors,
    CATALOG_SCHEMA_VERSION,
};
use mediakeep_discovery::StorageStatus;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ReportPaths {
    pub run_id: String,
    pub root: PathBuf,
    pub catalog_json: PathBuf,
    pub projects_json: PathBuf,
    pub storage_json: PathBuf,
    pub run_json: PathBuf,
}

/// Everything one report captures besides the drive catalog.
pub struct ReportInput<'a> {
    pub projects: &'a ProjectView,
    pub storage: &'a [StorageStatus],
    pub validation: &'a ValidationErrors,
    pub meta: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ProjectsReport<'a> {
    project_count: usize,
    master: &'a BTreeMap<String, Vec<ProjectRecord>>,
    backup: &'a BTreeMap<String, Vec<ProjectRecord>>,
    missing_on_backups: Vec<BackupGap>,
}

#[derive(Debug, Serialize)]
struct StorageReport<'a> {
    slots: &'a [StorageStatus],
    validation_errors: &'a ValidationErrors,
}

#[derive(Debug, Serialize)]
struct RunMetadata {
    run_id: String,
    created_at_utc: String,
    catalog_schema_version: String,
    catalog_snapshot_id: String,
    meta: Option<Value>,
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))
}

/// Writes `reports/<run-id>/{catalog,projects,storage,run}.json` under `base`.
pub fn create_report_bundle(
    base: impl AsRef<Path>,
    catalog: &CatalogSnapshot,
    input: ReportInput<'_>,
) -> Result<ReportPaths> {
    let run_id = Uuid::new_v4().to_string();
    let base = base.as_ref();
    let root = base.join("reports").join(&run_id);
    std::fs::create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;

    let catalog_json = root.join("catalog.json");
    let projects_json = root.join("projects.json");
    let storage_json = root.join("storage.json");
    let run_json = root.join("run.json");

    write_json(&catalog_json, catalog)?;
    write_json(
        &projects_json,
        &ProjectsReport {
            project_count: input.projects.real_project_count(),
            master: &input.projects.master,
            backup: &input.projects.backup,
            missing_on_backups: input.projects.missing_on_backups(),
        },
    )?;
    write_json(
        &storage_json,
        &StorageReport {
            slots: input.storage,
            validation_errors: input.validation,
        },
    )?;
    write_json(
        &run_json,
        &RunMetadata {
            run_id: run_id.clone(),
            created_at_utc: now_utc_rfc3339(),
            catalog_schema_version: CATALOG_SCHEMA_VERSION.to_string(),
            catalog_snapshot_id: catalog.snapshot_id.to_string(),
            meta: input.meta,
        },
    )?;

    Ok(ReportPaths {
        run_id,
        root,
        catalog_json,
        projects_json,
        storage_json,
        run_json,
    })
}
