use std::io::Write;

use anyhow::Result;
use mediakeep_core::{BackupGap, ProjectRecord, ProjectView, ValidationErrors};
use mediakeep_discovery::StorageStatus;

pub fn write_storage(
    out: &mut impl Write,
    statuses: &[StorageStatus],
    validation: &ValidationErrors,
) -> Result<()> {
    if statuses.is_empty() {
        writeln!(out, "no storage groups configured")?;
        return Ok(());
    }
    writeln!(out, "{:<14} {:<16} {:<24} {:<12} STATE", "SLOT", "LABEL", "SERIAL", "MOUNT")?;
    for status in statuses {
        writeln!(
            out,
            "{:<14} {:<16} {:<24} {:<12} {:?}",
            status.key.to_string(),
            status.label,
            status.serial_number,
            if status.mount_path.is_empty() { "-" } else { &status.mount_path },
            status.state
        )?;
    }
    for (key, message) in validation.iter() {
        writeln!(out, "error {key}: {message}")?;
    }
    Ok(())
}

fn write_section(
    out: &mut impl Write,
    title: &str,
    drives: &std::collections::BTreeMap<String, Vec<ProjectRecord>>,
) -> Result<()> {
    writeln!(out, "{title}")?;
    if drives.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for (label, records) in drives {
        let Some(first) = records.first() else {
            continue;
        };
        let drive = &first.drive;
        writeln!(
            out,
            "  {label} [{}] group {} serial {} free {} / {} bytes",
            drive.drive_letter,
            drive.storage_group,
            drive.serial_number,
            drive.metadata.free_bytes,
            drive.metadata.total_bytes
        )?;
        for record in records.iter().filter(|record| !record.is_placeholder()) {
            writeln!(out, "    {}", record.name)?;
        }
        if records.iter().all(ProjectRecord::is_placeholder) {
            writeln!(out, "    (no projects)")?;
        }
    }
    Ok(())
}

pub fn write_projects(out: &mut impl Write, view: &ProjectView) -> Result<()> {
    write_section(out, "Master", &view.master)?;
    write_section(out, "Backup", &view.backup)?;
    writeln!(out, "{} project(s)", view.real_project_count())?;
    Ok(())
}

pub fn write_matches(out: &mut impl Write, name: &str, view: &ProjectView) -> Result<()> {
    let hits = view.find(name);
    if hits.is_empty() {
        writeln!(out, "{name}: not found")?;
        return Ok(());
    }
    for record in hits {
        let role = match record.drive.backup_id {
            Some(id) => format!("{} {}", record.drive.drive_type, id),
            None => record.drive.drive_type.to_string(),
        };
        writeln!(
            out,
            "{name}: {} ({role}, group {}) {}",
            record.drive.label,
            record.drive.storage_group,
            record.path.display()
        )?;
    }
    Ok(())
}

pub fn write_gaps(out: &mut impl Write, gaps: &[BackupGap]) -> Result<()> {
    if gaps.is_empty() {
        writeln!(out, "every master project is present on its backups")?;
        return Ok(());
    }
    for gap in gaps {
        writeln!(
            out,
            "{} (group {}, on {}) missing on: {}",
            gap.project,
            gap.storage_group,
            gap.master_label,
            gap.missing_on.join(", ")
        )?;
    }
    Ok(())
}
