use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::OutputError;

/// Appended when the resolved file name carries no extension.
pub const DEFAULT_EXTENSION: &str = "xlsx";

/// Where the exported report lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub directory: PathBuf,
    pub file_name: String,
}

impl OutputTarget {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Resolve the output location for one run.
///
/// `override_path` wins over `base_dir`/`template`. The template takes strftime
/// directives, formatted against `timestamp`. Does not touch the filesystem.
pub fn resolve(
    template: &str,
    timestamp: NaiveDateTime,
    override_path: Option<&Path>,
    base_dir: &Path,
) -> Result<OutputTarget, OutputError> {
    let full_path = match override_path {
        Some(path) => path.to_path_buf(),
        None => base_dir.join(render_template(template, timestamp)?),
    };

    let mut file_name = full_path
        .file_name()
        .ok_or_else(|| OutputError::NoFileName(full_path.display().to_string()))?
        .to_str()
        .ok_or_else(|| OutputError::NonUtf8FileName(full_path.display().to_string()))?
        .to_string();

    let parent = full_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let directory = std::path::absolute(parent)?;

    // A trailing dot ("report.") counts as no extension.
    let has_extension = Path::new(&file_name)
        .extension()
        .is_some_and(|ext| !ext.is_empty());
    if !has_extension {
        file_name.push('.');
        file_name.push_str(DEFAULT_EXTENSION);
    }

    debug!(directory = %directory.display(), file_name = %file_name, "resolved output target");
    Ok(OutputTarget {
        directory,
        file_name,
    })
}

fn render_template(template: &str, timestamp: NaiveDateTime) -> Result<String, OutputError> {
    let mut name = String::new();
    write!(name, "{}", timestamp.format(template))
        .map_err(|_| OutputError::InvalidTemplate(template.to_string()))?;
    if name.trim().is_empty() {
        return Err(OutputError::InvalidTemplate(template.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn jan_fifth() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap()
    }

    #[test]
    fn formats_template_into_base_dir() {
        let target = resolve("report_%Y%m%d", jan_fifth(), None, Path::new("/out")).unwrap();
        assert_eq!(target.directory, PathBuf::from("/out"));
        assert_eq!(target.file_name, "report_20240105.xlsx");
        assert_eq!(target.path(), PathBuf::from("/out/report_20240105.xlsx"));
    }

    #[test]
    fn template_may_carry_time_and_extension() {
        let target = resolve(
            "sales/%Y/boat_sales_%H%M.xls",
            jan_fifth(),
            None,
            Path::new("/share"),
        )
        .unwrap();
        assert_eq!(target.directory, PathBuf::from("/share/sales/2024"));
        assert_eq!(target.file_name, "boat_sales_1430.xls");
    }

    #[test]
    fn override_keeps_its_extension() {
        let target = resolve(
            "report_%Y%m%d",
            jan_fifth(),
            Some(Path::new("/tmp/custom.csv")),
            Path::new("/out"),
        )
        .unwrap();
        assert_eq!(target.directory, PathBuf::from("/tmp"));
        assert_eq!(target.file_name, "custom.csv");
    }

    #[test]
    fn override_without_extension_gets_default() {
        let target = resolve(
            "report_%Y%m%d",
            jan_fifth(),
            Some(Path::new("/tmp/custom")),
            Path::new("/out"),
        )
        .unwrap();
        assert_eq!(target.directory, PathBuf::from("/tmp"));
        assert_eq!(target.file_name, "custom.xlsx");
    }

    #[test]
    fn trailing_dot_is_not_an_extension() {
        let target = resolve(
            "ignored",
            jan_fifth(),
            Some(Path::new("/tmp/foo.")),
            Path::new("/out"),
        )
        .unwrap();
        assert_eq!(target.file_name, "foo..xlsx");
    }

    #[test]
    fn dotfile_without_extension_gets_default() {
        let target = resolve(
            "ignored",
            jan_fifth(),
            Some(Path::new("/tmp/.report")),
            Path::new("/out"),
        )
        .unwrap();
        assert_eq!(target.file_name, ".report.xlsx");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_file_name_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = Path::new("/tmp").join(OsStr::from_bytes(b"sales_\xff.xlsx"));
        assert!(matches!(
            resolve("ignored", jan_fifth(), Some(&raw), Path::new("/out")),
            Err(OutputError::NonUtf8FileName(_))
        ));
    }

    #[test]
    fn relative_path_is_made_absolute() {
        let target = resolve("ignored", jan_fifth(), Some(Path::new("custom")), Path::new("/out"))
            .unwrap();
        assert!(target.directory.is_absolute());
        assert_eq!(target.directory, std::env::current_dir().unwrap());
        assert_eq!(target.file_name, "custom.xlsx");
    }

    #[test]
    fn resolution_is_idempotent() {
        let first = resolve("report_%Y%m%d", jan_fifth(), None, Path::new("/out")).unwrap();
        let second = resolve("report_%Y%m%d", jan_fifth(), None, Path::new("/out")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_bad_templates_and_paths() {
        assert!(matches!(
            resolve("report_%Q", jan_fifth(), None, Path::new("/out")),
            Err(OutputError::InvalidTemplate(_))
        ));
        assert!(matches!(
            resolve("", jan_fifth(), None, Path::new("/out")),
            Err(OutputError::InvalidTemplate(_))
        ));
        assert!(matches!(
            resolve("x", jan_fifth(), Some(Path::new("/")), Path::new("/out")),
            Err(OutputError::NoFileName(_))
        ));
    }
}
