use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;

use super::process::{ChildLimits, run_bounded};
use super::{CancelToken, PageRecognizer, Recognition};
use crate::config::SplitConfig;
use crate::pdf::PageSize;

#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    pdf_path: PathBuf,
    safe_stem: String,
    ocr_lang: String,
    ocr_threads: usize,
    dpi: u32,
    footer_fraction: Option<f32>,
    page_sizes: Vec<PageSize>,
    limits: ChildLimits,
}

impl TesseractRecognizer {
    pub fn new(pdf_path: &Path, config: &SplitConfig, page_sizes: Vec<PageSize>) -> Self {
        let pdf_stem = pdf_path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("pdf");

        Self {
            pdf_path: pdf_path.to_path_buf(),
            safe_stem: safe_file_component(pdf_stem),
            ocr_lang: config.ocr_lang.clone(),
            ocr_threads: config.ocr_threads,
            dpi: config.dpi,
            footer_fraction: config.footer_fraction,
            page_sizes,
            limits: ChildLimits {
                timeout: Duration::from_millis(config.per_page_timeout_ms),
                cancel_grace: Duration::from_millis(config.cancel_grace_ms),
            },
        }
    }

    fn footer_crop(&self, page_index: usize) -> Option<CropBox> {
        let fraction = self.footer_fraction?;
        let size = self.page_sizes.get(page_index)?;
        Some(footer_crop_box(*size, self.dpi, fraction))
    }
}

impl PageRecognizer for TesseractRecognizer {
    fn recognize(&self, page_index: usize, cancel: &CancelToken) -> Result<Recognition> {
        let page_number = page_index + 1;
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let output_root = std::env::temp_dir().join(format!(
            "casesplit_ocr_{}_{}_{}_{}",
            self.safe_stem,
            std::process::id(),
            page_number,
            stamp
        ));
        let png_path = PathBuf::from(format!("{}.png", output_root.display()));
        let tsv_path = PathBuf::from(format!("{}.tsv", output_root.display()));
        let _cleanup = RemoveOnDrop(vec![png_path.clone(), tsv_path.clone()]);

        let mut pdftoppm = Command::new("pdftoppm");
        pdftoppm
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-singlefile")
            .arg("-png");
        if let Some(crop) = self.footer_crop(page_index) {
            pdftoppm
                .arg("-x")
                .arg(crop.x.to_string())
                .arg("-y")
                .arg(crop.y.to_string())
                .arg("-W")
                .arg(crop.width.to_string())
                .arg("-H")
                .arg(crop.height.to_string());
        }
        pdftoppm.arg(&self.pdf_path).arg(&output_root);
        run_bounded(pdftoppm, "pdftoppm", self.limits, cancel)
            .with_context(|| format!("failed to rasterize page {page_number}"))?;

        if !png_path.exists() {
            bail!(
                "pdftoppm did not produce expected image for {} page {}",
                self.pdf_path.display(),
                page_number
            );
        }

        let mut tesseract = Command::new("tesseract");
        tesseract
            .env("OMP_THREAD_LIMIT", self.ocr_threads.to_string())
            .arg(&png_path)
            .arg(&output_root)
            .arg("-l")
            .arg(&self.ocr_lang)
            .arg("tsv");
        run_bounded(tesseract, "tesseract", self.limits, cancel)
            .with_context(|| format!("failed to recognize page {page_number}"))?;

        let raw = fs::read(&tsv_path)
            .with_context(|| format!("failed to read {}", tsv_path.display()))?;
        Ok(parse_tsv(&String::from_utf8_lossy(&raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CropBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

fn footer_crop_box(size: PageSize, dpi: u32, fraction: f32) -> CropBox {
    let scale = f64::from(dpi) / 72.0;
    let width = (size.width_pts * scale).round().max(1.0) as u32;
    let height = (size.height_pts * scale).round().max(1.0) as u32;
    let footer = ((f64::from(height) * f64::from(fraction)).round() as u32).clamp(1, height);

    CropBox {
        x: 0,
        y: height - footer,
        width,
        height: footer,
    }
}

fn parse_tsv(raw: &str) -> Recognition {
    let mut lines = Vec::<String>::new();
    let mut current_key: Option<(String, String, String, String)> = None;
    let mut confidence_sum = 0.0f64;
    let mut word_count = 0usize;

    for row in raw.lines().skip(1) {
        let columns = row.splitn(12, '\t').collect::<Vec<&str>>();
        if columns.len() < 12 || columns[0] != "5" {
            continue;
        }
        let text = columns[11].trim();
        if text.is_empty() {
            continue;
        }
        let Ok(confidence) = columns[10].trim().parse::<f64>() else {
            continue;
        };

        let key = (
            columns[1].to_string(),
            columns[2].to_string(),
            columns[3].to_string(),
            columns[4].to_string(),
        );
        if current_key.as_ref() == Some(&key) {
            if let Some(line) = lines.last_mut() {
                line.push(' ');
                line.push_str(text);
            }
        } else {
            lines.push(text.to_string());
            current_key = Some(key);
        }

        if confidence >= 0.0 {
            confidence_sum += confidence;
            word_count += 1;
        }
    }

    let confidence = if word_count == 0 {
        0.0
    } else {
        ((confidence_sum / word_count as f64) / 100.0).clamp(0.0, 1.0) as f32
    };

    Recognition {
        text: lines.join("\n"),
        confidence,
    }
}

fn safe_file_component(value: &str) -> String {
    value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect::<String>()
}

struct RemoveOnDrop(Vec<PathBuf>);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        for path in &self.0 {
            let _ = fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn tsv_words_are_joined_per_line() {
        let raw = [
            HEADER,
            "1\t1\t0\t0\t0\t0\t0\t0\t2550\t3300\t-1\t",
            "4\t1\t1\t1\t1\t0\t100\t3000\t900\t40\t-1\t",
            "5\t1\t1\t1\t1\t1\t100\t3000\t120\t40\t96.5\tCase",
            "5\t1\t1\t1\t1\t2\t230\t3000\t200\t40\t91.0\tNumber:",
            "5\t1\t1\t1\t1\t3\t440\t3000\t300\t40\t88.5\tI-201-345",
            "5\t1\t1\t1\t2\t1\t2000\t3050\t100\t40\t94.0\tPage",
            "5\t1\t1\t1\t2\t2\t2110\t3050\t30\t40\t90.0\t2",
            "5\t1\t1\t1\t2\t3\t2150\t3050\t50\t40\t-1\t ",
        ]
        .join("\n");

        let recognition = parse_tsv(&raw);
        assert_eq!(recognition.text, "Case Number: I-201-345\nPage 2");
        assert!((recognition.confidence - 0.92).abs() < 0.001);
    }

    #[test]
    fn empty_tsv_has_zero_confidence() {
        let recognition = parse_tsv(HEADER);
        assert_eq!(recognition.text, "");
        assert_eq!(recognition.confidence, 0.0);
        assert_eq!(parse_tsv("").confidence, 0.0);
    }

    #[test]
    fn footer_crop_covers_bottom_of_page() {
        let size = PageSize {
            width_pts: 612.0,
            height_pts: 792.0,
        };
        let crop = footer_crop_box(size, 144, 0.1);
        assert_eq!(
            crop,
            CropBox {
                x: 0,
                y: 1426,
                width: 1224,
                height: 158,
            }
        );
    }

    #[test]
    fn file_component_keeps_only_ascii_alphanumerics() {
        assert_eq!(safe_file_component("Docket 2024 (final)"), "Docket_2024__final_");
    }
}
