use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;

use crate::model::ToolVersions;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pts: f64,
    pub height_pts: f64,
}

pub fn page_count(pdf_path: &Path) -> Result<usize> {
    let stdout = run_pdfinfo(pdf_path, None)?;
    parse_page_count(&stdout)
        .with_context(|| format!("pdfinfo reported no page count for {}", pdf_path.display()))
}

pub fn page_sizes(pdf_path: &Path, page_count: usize) -> Result<Vec<PageSize>> {
    if page_count == 0 {
        return Ok(Vec::new());
    }
    let stdout = run_pdfinfo(pdf_path, Some(page_count))?;
    let sizes = parse_page_sizes(&stdout)?;
    if sizes.len() != page_count {
        bail!(
            "pdfinfo listed {} page sizes for {} pages in {}",
            sizes.len(),
            page_count,
            pdf_path.display()
        );
    }
    Ok(sizes)
}

/// Writes an inclusive, 0-based source page range into a new PDF.
pub trait RangeWriter {
    fn write_range(&self, source: &Path, first: usize, last: usize, dest: &Path) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct QpdfWriter;

impl RangeWriter for QpdfWriter {
    fn write_range(&self, source: &Path, first: usize, last: usize, dest: &Path) -> Result<()> {
        write_range(source, first, last, dest)
    }
}

pub fn write_range(source: &Path, first: usize, last: usize, dest: &Path) -> Result<()> {
    if first > last {
        bail!("invalid page range {first}..={last}");
    }

    let output = Command::new("qpdf")
        .arg("--empty")
        .arg("--pages")
        .arg(source)
        .arg(format!("{}-{}", first + 1, last + 1))
        .arg("--")
        .arg(dest)
        .output()
        .with_context(|| format!("failed to execute qpdf for {}", source.display()))?;

    // qpdf exits with 3 when it succeeded but printed warnings.
    if !output.status.success() && output.status.code() != Some(3) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "qpdf returned non-zero exit status for {} pages {}-{}: {}",
            source.display(),
            first + 1,
            last + 1,
            stderr.trim()
        );
    }

    if !dest.exists() {
        bail!("qpdf did not produce {}", dest.display());
    }

    Ok(())
}

pub fn command_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

pub fn collect_tool_versions() -> ToolVersions {
    ToolVersions {
        pdfinfo: command_version("pdfinfo", &["-v"]),
        pdftoppm: command_version("pdftoppm", &["-v"]),
        tesseract: command_version("tesseract", &["--version"]),
        qpdf: command_version("qpdf", &["--version"]),
    }
}

fn command_version(program: &str, args: &[&str]) -> String {
    let Ok(output) = Command::new(program).args(args).output() else {
        return "unavailable".to_string();
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn run_pdfinfo(pdf_path: &Path, last_page: Option<usize>) -> Result<String> {
    if !pdf_path.is_file() {
        bail!("file not found: {}", pdf_path.display());
    }

    let mut command = Command::new("pdfinfo");
    if let Some(last_page) = last_page {
        command.arg("-f").arg("1").arg("-l").arg(last_page.to_string());
    }
    command.arg(pdf_path);

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdfinfo for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdfinfo returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn parse_page_count(stdout: &str) -> Option<usize> {
    stdout.lines().find_map(|line| {
        let value = line.strip_prefix("Pages:")?;
        value.trim().parse::<usize>().ok()
    })
}

fn parse_page_sizes(stdout: &str) -> Result<Vec<PageSize>> {
    let pattern = Regex::new(r"^Page\s+\d+\s+size:\s+([0-9.]+)\s+x\s+([0-9.]+)\s+pts")
        .context("failed to compile page size regex")?;

    let mut sizes = Vec::new();
    for line in stdout.lines() {
        let Some(captures) = pattern.captures(line.trim()) else {
            continue;
        };
        let width_pts = captures[1]
            .parse::<f64>()
            .with_context(|| format!("invalid page width in: {line}"))?;
        let height_pts = captures[2]
            .parse::<f64>()
            .with_context(|| format!("invalid page height in: {line}"))?;
        sizes.push(PageSize {
            width_pts,
            height_pts,
        });
    }
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDFINFO_OUTPUT: &str = "Title:          Consolidated filing
Producer:       Scanner 3000
Page    1 size: 612 x 792 pts (letter)
Page    1 rot:  0
Page    2 size: 595.276 x 841.89 pts (A4)
Page    2 rot:  0
Pages:          2
Encrypted:      no
";

    #[test]
    fn page_count_is_read_from_pdfinfo() {
        assert_eq!(parse_page_count(PDFINFO_OUTPUT), Some(2));
        assert_eq!(parse_page_count("Pages:          0\n"), Some(0));
        assert_eq!(parse_page_count("Title: nothing"), None);
    }

    #[test]
    fn page_sizes_are_read_in_order() {
        let sizes = parse_page_sizes(PDFINFO_OUTPUT).unwrap();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].width_pts, 612.0);
        assert_eq!(sizes[1].height_pts, 841.89);
    }

    #[test]
    fn missing_source_is_reported() {
        let error = page_count(Path::new("/nonexistent/bundle.pdf")).unwrap_err();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn inverted_range_is_rejected_before_running_qpdf() {
        let error = write_range(Path::new("a.pdf"), 3, 1, Path::new("b.pdf")).unwrap_err();
        assert!(error.to_string().contains("invalid page range"));
    }
}
