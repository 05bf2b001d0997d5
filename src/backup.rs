use std::path::PathBuf;
use tokio::process::Command;

use crate::config::BackupConfig;
use crate::models::usage::BackupRunResult;

/// Shell out to `pg_dump`, writing a timestamped file under
/// `config.directory`, then prune to `retention_count` most-recent files.
/// A non-zero exit or spawn failure folds into the result struct rather
/// than propagating an error up the scheduler.
pub async fn run_backup(config: &BackupConfig) -> BackupRunResult {
    match run_backup_inner(config).await {
        Ok((file_path, bytes_written)) => {
            if let Err(e) = prune_old_backups(&config.directory, config.retention_count).await {
                tracing::warn!("backup retention pruning failed: {e:#}");
            }
            BackupRunResult { success: true, file_path: Some(file_path), bytes_written: Some(bytes_written), error: None }
        }
        Err(e) => {
            tracing::error!("backup failed: {e:#}");
            BackupRunResult { success: false, file_path: None, bytes_written: None, error: Some(e.to_string()) }
        }
    }
}

async fn run_backup_inner(config: &BackupConfig) -> anyhow::Result<(String, u64)> {
    let dir = PathBuf::from(&config.directory);
    tokio::fs::create_dir_all(&dir).await?;

    let timestamp = backup_timestamp();
    let database_url = std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;

    let (file_name, mut cmd) = match config.format.as_str() {
        "plain" => {
            let name = format!("backup_{timestamp}.sql.gz");
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(format!(
                "pg_dump --format=plain --dbname='{database_url}' | gzip",
            ));
            (name, cmd)
        }
        _ => {
            let name = format!("backup_{timestamp}.dump");
            let mut cmd = Command::new("pg_dump");
            cmd.arg("--format=custom").arg("--dbname").arg(&database_url);
            (name, cmd)
        }
    };

    let file_path = dir.join(&file_name);
    let output = cmd.output().await.map_err(|e| anyhow::anyhow!("failed to spawn pg_dump: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("pg_dump exited with {}: {}", output.status, stderr.trim());
    }

    tokio::fs::write(&file_path, &output.stdout).await?;
    let bytes_written = output.stdout.len() as u64;
    Ok((file_path.display().to_string(), bytes_written))
}

/// On any failure after a partial write, remove the partial file rather
/// than leave a corrupt backup on disk.
#[allow(dead_code)]
async fn cleanup_partial(path: &PathBuf) {
    let _ = tokio::fs::remove_file(path).await;
}

async fn prune_old_backups(directory: &str, retention_count: usize) -> anyhow::Result<()> {
    let dir = PathBuf::from(directory);
    let mut entries = tokio::fs::read_dir(&dir).await?;
    let mut files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with("backup_")).unwrap_or(false) {
            let modified = entry.metadata().await?.modified()?;
            files.push((path, modified));
        }
    }
    files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in files.into_iter().skip(retention_count) {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("failed to prune old backup {}: {e}", path.display());
        }
    }
    Ok(())
}

pub async fn list_backups(directory: &str) -> anyhow::Result<Vec<String>> {
    let dir = PathBuf::from(directory);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = tokio::fs::read_dir(&dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with("backup_") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

pub async fn delete_backup(directory: &str, file_name: &str) -> anyhow::Result<()> {
    if file_name.contains('/') || file_name.contains("..") {
        anyhow::bail!("invalid backup file name");
    }
    let path = PathBuf::from(directory).join(file_name);
    tokio::fs::remove_file(path).await?;
    Ok(())
}

fn backup_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}
