use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::error::{AppError, Result};

pub fn ensure_reports_dir(output_dir: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(output_dir)?;
    Ok(output_dir.to_path_buf())
}

/// Writes a rendered report into `output_dir` and returns its path.
pub fn save_report(output_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
        return Err(AppError::ValidationError(format!(
            "invalid report file name '{}'",
            file_name
        )));
    }

    let dir = ensure_reports_dir(output_dir)?;
    let path = dir.join(file_name);
    fs::write(&path, bytes)?;
    Ok(path)
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_report_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("reports").join("2026");

        let path = save_report(&dir, "Safety_Report.pdf", b"%PDF-1.5").unwrap();

        assert_eq!(path, dir.join("Safety_Report.pdf"));
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.5");
    }

    #[test]
    fn test_save_report_rejects_path_names() {
        let root = tempfile::tempdir().unwrap();
        for name in ["", "../escape.pdf", "nested/report.pdf", ".hidden"] {
            assert!(matches!(
                save_report(root.path(), name, b"x"),
                Err(AppError::ValidationError(_))
            ));
        }
    }
}
