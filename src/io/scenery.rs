//! Stationary-object list - scene objects removed before a session

use crate::domain::error::{CaptureError, Result};
use std::fs;
use std::path::Path;

/// Read newline-delimited object identifiers, skipping blank lines
pub fn load_object_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| CaptureError::MissingInput(format!("object list {}: {e}", path.display())))?;

    let objects: Vec<String> =
        content.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect();

    if objects.is_empty() {
        return Err(CaptureError::MissingInput(format!("object list {} is empty", path.display())));
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    #[test]
    fn test_load_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Tree_12\n\n  Bench_3  \r\nLamp_7").unwrap();
        let objects = load_object_list(file.path()).unwrap();
        assert_eq!(objects, vec!["Tree_12", "Bench_3", "Lamp_7"]);
    }

    #[test]
    fn test_empty_list_is_missing_input() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();
        assert!(matches!(load_object_list(file.path()).unwrap_err(), CaptureError::MissingInput(_)));
    }

    #[test]
    fn test_absent_list_is_missing_input() {
        assert!(matches!(
            load_object_list("/nonexistent/objects.txt").unwrap_err(),
            CaptureError::MissingInput(_)
        ));
    }
}
