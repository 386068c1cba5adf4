use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Extension appended to DKD-encoded outputs.
pub const ENCODED_EXT: &str = "dkd";
/// Extension appended to envelope-encrypted outputs.
pub const SEALED_EXT: &str = "enc";

pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn write_bytes(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `report.pdf` -> `report.pdf.dkd`.
pub fn encoded_name(input: &Path) -> String {
    format!("{}.{}", display_name(input), ENCODED_EXT)
}

/// `report.pdf.dkd` -> `report.pdf`; anything without the extension gets
/// `.out` appended so the source file is never overwritten by default.
pub fn decoded_name(input: &Path) -> String {
    let name = display_name(input);
    match name.strip_suffix(&format!(".{ENCODED_EXT}")) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => format!("{name}.out"),
    }
}

/// `report.pdf` -> `report.pdf.enc`.
pub fn sealed_name(input: &Path) -> String {
    format!("{}.{}", display_name(input), SEALED_EXT)
}

/// `report.pdf.enc` -> `report.pdf`; anything else gets `.out` appended.
pub fn opened_name(input: &Path) -> String {
    let name = display_name(input);
    match name.strip_suffix(&format!(".{SEALED_EXT}")) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => format!("{name}.out"),
    }
}

/// `scan.pdf` + "rotated" -> `scan_rotated.pdf`.
pub fn suffixed_pdf_name(input: &Path, suffix: &str) -> String {
    format!("{}_{suffix}.pdf", stem(input))
}

/// `scan.pdf` + 3 -> `scan_page3.pdf`.
pub fn page_pdf_name(input: &Path, page: u32) -> String {
    format!("{}_page{page}.pdf", stem(input))
}

fn stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// Chooses where an output lands: an explicit path wins, then an output
/// directory (flag or config), then alongside the input.
pub fn resolve_output(
    input: &Path,
    file_name: &str,
    output: Option<&Path>,
    out_dir: Option<&Path>,
) -> PathBuf {
    if let Some(out) = output {
        return out.to_path_buf();
    }
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_name_appends_extension() {
        assert_eq!(encoded_name(Path::new("/tmp/report.pdf")), "report.pdf.dkd");
        assert_eq!(encoded_name(Path::new("noext")), "noext.dkd");
    }

    #[test]
    fn decoded_name_strips_or_marks() {
        assert_eq!(decoded_name(Path::new("/tmp/report.pdf.dkd")), "report.pdf");
        assert_eq!(decoded_name(Path::new("plain.bin")), "plain.bin.out");
        assert_eq!(decoded_name(Path::new(".dkd")), ".dkd.out");
    }

    #[test]
    fn envelope_names_mirror_the_codec_scheme() {
        assert_eq!(sealed_name(Path::new("/x/report.pdf")), "report.pdf.enc");
        assert_eq!(opened_name(Path::new("/x/report.pdf.enc")), "report.pdf");
        assert_eq!(opened_name(Path::new("/x/odd.bin")), "odd.bin.out");
    }

    #[test]
    fn pdf_names_follow_the_stem() {
        let input = Path::new("/data/scan.pdf");
        assert_eq!(suffixed_pdf_name(input, "rotated"), "scan_rotated.pdf");
        assert_eq!(suffixed_pdf_name(input, "merged"), "scan_merged.pdf");
        assert_eq!(page_pdf_name(input, 7), "scan_page7.pdf");
    }

    #[test]
    fn explicit_output_wins() {
        let path = resolve_output(
            Path::new("/a/in.pdf"),
            "in_rotated.pdf",
            Some(Path::new("/b/exact.pdf")),
            Some(Path::new("/c")),
        );
        assert_eq!(path, PathBuf::from("/b/exact.pdf"));
    }

    #[test]
    fn out_dir_beats_input_directory() {
        let path = resolve_output(Path::new("/a/in.pdf"), "x.pdf", None, Some(Path::new("/c")));
        assert_eq!(path, PathBuf::from("/c/x.pdf"));

        let path = resolve_output(Path::new("/a/in.pdf"), "x.pdf", None, None);
        assert_eq!(path, PathBuf::from("/a/x.pdf"));
    }

    #[test]
    fn bare_input_falls_back_to_cwd() {
        let path = resolve_output(Path::new("in.pdf"), "x.pdf", None, None);
        assert_eq!(path, PathBuf::from("./x.pdf"));
    }

    #[test]
    fn write_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/out.bin");
        write_bytes(&nested, b"payload").unwrap();
        assert_eq!(read_bytes(&nested).unwrap(), b"payload");
    }
}
