//! Mock user-directory export.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use jobcast_queue::{ExecutionError, JobExecutor};
use rust_xlsxwriter::{Workbook, XlsxError};
use tracing::debug;

const HEADER: [&str; 6] = ["ID", "Name", "Email", "Phone", "Address", "Note"];
const ADDRESS: &str = "123 Mockingbird Lane, Springfield, USA";
const NOTE: &str = "This is a note field with some repeated text to increase file size.";

/// Writes an `.xlsx` export into the public directory.
#[derive(Debug, Clone)]
pub struct ExportExecutor {
    public_dir: PathBuf,
    rows: u32,
}

impl ExportExecutor {
    pub fn new(public_dir: impl Into<PathBuf>, rows: u32) -> Self {
        Self {
            public_dir: public_dir.into(),
            rows,
        }
    }
}

#[async_trait]
impl JobExecutor for ExportExecutor {
    async fn execute(&self, task_id: &str) -> Result<String, ExecutionError> {
        if task_id.is_empty()
            || !task_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("invalid task id for export file name: {task_id:?}").into());
        }

        let file_name = format!(
            "export_{}_{task_id}.xlsx",
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        let path = self.public_dir.join(&file_name);
        let rows = self.rows;

        tokio::task::spawn_blocking(move || write_export(&path, rows)).await??;

        debug!(%task_id, file = %file_name, rows, "Export written");
        Ok(file_name)
    }
}

fn write_export(path: &Path, rows: u32) -> Result<(), XlsxError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(XlsxError::IoError)?;
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, title) in (0u16..).zip(HEADER) {
        sheet.write_string(0, col, title)?;
    }
    for id in 1..=rows {
        sheet.write_number(id, 0, f64::from(id))?;
        sheet.write_string(id, 1, &format!("User {id}"))?;
        sheet.write_string(id, 2, &format!("user{id}@example.com"))?;
        sheet.write_string(id, 3, &format!("081-000-{id:04}"))?;
        sheet.write_string(id, 4, ADDRESS)?;
        sheet.write_string(id, 5, NOTE)?;
    }

    workbook.save(path)
}
