//! Output assembly: OCR pages → Markdown document on disk.

use crate::error::{AttemptError, BatchError};
use crate::pipeline::input::resolve;
use crate::pipeline::ocr::OcrPage;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Concatenate pages in response order.
///
/// Each page becomes `## Page N` (N = index + 1), a blank line, the page
/// text and a trailing blank line.
pub fn render_document(pages: &[OcrPage]) -> String {
    let mut out = String::new();
    for page in pages {
        out.push_str(&format!("## Page {}\n\n", page.index + 1));
        out.push_str(&page.markdown);
        out.push_str("\n\n");
    }
    out
}

/// Output location for input `filename`: same relative path under
/// `output_dir`, extension replaced by `extension`.
pub fn output_path_for(output_dir: &Path, filename: &str, extension: &str) -> PathBuf {
    resolve(output_dir, filename).with_extension(extension)
}

/// Output locations for every input in `filenames`.
///
/// Inputs whose mirrored paths would coincide (`scan.pdf` and `scan.png`, or
/// `a.pdf` and `a.PDF`) keep their source extension instead:
/// `scan.pdf.md`, `scan.png.md`. Mirrored paths are grouped
/// case-insensitively so the result is also safe on case-insensitive
/// filesystems. Two inputs still left with the same path is a
/// configuration error.
pub fn output_paths(
    output_dir: &Path,
    filenames: &[String],
    extension: &str,
) -> Result<BTreeMap<String, PathBuf>, BatchError> {
    let mut by_key: HashMap<String, Vec<&String>> = HashMap::new();
    for f in filenames {
        let key = collision_key(&output_path_for(output_dir, f, extension));
        by_key.entry(key).or_default().push(f);
    }

    let mut paths = BTreeMap::new();
    let mut claimed: HashMap<PathBuf, &String> = HashMap::new();
    for f in filenames {
        let plain = output_path_for(output_dir, f, extension);
        let path = if by_key[&collision_key(&plain)].len() > 1 {
            let path = keep_source_extension(output_dir, f, extension);
            warn!(
                "{} shares its output name with another input; writing {}",
                f,
                path.display()
            );
            path
        } else {
            plain
        };

        if let Some(other) = claimed.insert(path.clone(), f) {
            return Err(BatchError::InvalidConfig(format!(
                "inputs '{other}' and '{f}' both map to output '{}'",
                path.display()
            )));
        }
        paths.insert(f.clone(), path);
    }
    Ok(paths)
}

/// `out/scan.pdf` + `md` → `out/scan.pdf.md`.
fn keep_source_extension(output_dir: &Path, filename: &str, extension: &str) -> PathBuf {
    let mut name: OsString = resolve(output_dir, filename).into_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn collision_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Write `contents` to `path`, creating parent directories.
///
/// The document is written to a temporary file beside `path` and renamed
/// into place, so a crash never leaves a half-written document.
pub fn write_document(path: &Path, contents: &str) -> Result<(), AttemptError> {
    let fail = |detail: String| AttemptError::OutputWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| fail(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| fail(e.to_string()))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| fail(e.to_string()))?;
    tmp.persist(path).map_err(|e| fail(e.error.to_string()))?;

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn page(index: usize, text: &str) -> OcrPage {
        OcrPage {
            index,
            markdown: text.to_string(),
        }
    }

    #[test]
    fn three_pages_get_three_headers() {
        let doc = render_document(&[page(0, "alpha"), page(1, "beta"), page(2, "gamma")]);
        assert_eq!(
            doc,
            "## Page 1\n\nalpha\n\n## Page 2\n\nbeta\n\n## Page 3\n\ngamma\n\n"
        );
        assert_eq!(doc.matches("## Page ").count(), 3);
    }

    #[test]
    fn no_pages_renders_empty() {
        assert_eq!(render_document(&[]), "");
    }

    #[test]
    fn output_path_mirrors_input() {
        let p = output_path_for(Path::new("out"), "sub/report.final.PDF", "md");
        assert_eq!(p, Path::new("out").join("sub").join("report.final.md"));
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn distinct_stems_keep_plain_names() {
        let paths = output_paths(Path::new("out"), &names(&["a.pdf", "sub/a.pdf"]), "md").unwrap();
        assert_eq!(paths["a.pdf"], Path::new("out").join("a.md"));
        assert_eq!(paths["sub/a.pdf"], Path::new("out").join("sub").join("a.md"));
    }

    #[test]
    fn shared_stem_keeps_source_extension() {
        let paths = output_paths(
            Path::new("out"),
            &names(&["notes.pdf", "scan.PDF", "scan.pdf", "scan.png"]),
            "md",
        )
        .unwrap();
        assert_eq!(paths["notes.pdf"], Path::new("out").join("notes.md"));
        assert_eq!(paths["scan.PDF"], Path::new("out").join("scan.PDF.md"));
        assert_eq!(paths["scan.pdf"], Path::new("out").join("scan.pdf.md"));
        assert_eq!(paths["scan.png"], Path::new("out").join("scan.png.md"));
    }

    #[test]
    fn shared_stem_differing_only_in_case_is_disambiguated() {
        let paths = output_paths(Path::new("out"), &names(&["Scan.pdf", "scan.png"]), "md").unwrap();
        assert_eq!(paths["Scan.pdf"], Path::new("out").join("Scan.pdf.md"));
        assert_eq!(paths["scan.png"], Path::new("out").join("scan.png.md"));
    }

    #[test]
    fn unresolvable_collision_is_config_error() {
        // `x.pdf.png` mirrors to `x.pdf.md`, which is also the long form of `x.pdf`.
        let err = output_paths(
            Path::new("out"),
            &names(&["x.pdf", "x.png", "x.pdf.png"]),
            "md",
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)), "got {err:?}");
    }

    #[test]
    fn write_creates_parents_and_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/doc.md");
        write_document(&path, "first").unwrap();
        write_document(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn write_into_file_parent_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let err = write_document(&blocker.join("doc.md"), "x").unwrap_err();
        assert!(matches!(err, AttemptError::OutputWriteFailed { .. }));
    }
}
