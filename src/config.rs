use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CASE_PATTERN: &str = r"(?i)\bcase\s*(?:(?:number|num|no)\b\.?|#)\s*[:#]?\s*([0-9A-Z|]+(?:\s*[-–—‐]\s*[0-9A-Z|]+)*)";

pub const DEFAULT_PAGE_COUNTER_PATTERN: &str = r"(?i)\b(?:page|pg|p\.|seite|p[aá]gina)\s*([0-9OIl|]+)\s*(?:of|von|de|sur|/)\s*([0-9OIl|]+)";

pub const MAX_WORKER_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub case_pattern: String,
    pub page_counter_pattern: String,
    pub case_label: String,
    pub case_label_similarity: f64,
    pub confidence_threshold: f32,
    pub worker_count: usize,
    pub per_page_timeout_ms: u64,
    pub ocr_threads: usize,
    pub ocr_lang: String,
    pub dpi: u32,
    pub footer_fraction: Option<f32>,
    pub cancel_grace_ms: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            case_pattern: DEFAULT_CASE_PATTERN.to_string(),
            page_counter_pattern: DEFAULT_PAGE_COUNTER_PATTERN.to_string(),
            case_label: "case number".to_string(),
            case_label_similarity: 0.7,
            confidence_threshold: 0.6,
            worker_count: 1,
            per_page_timeout_ms: 60_000,
            ocr_threads: 1,
            ocr_lang: "eng".to_string(),
            dpi: 200,
            footer_fraction: None,
            cancel_grace_ms: 5_000,
        }
    }
}

impl SplitConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: SplitConfig = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.case_label_similarity) {
            bail!(
                "case_label_similarity must be within [0, 1], got {}",
                self.case_label_similarity
            );
        }
        if self.case_label.trim().is_empty() {
            bail!("case_label must not be empty");
        }
        if self.worker_count == 0 || self.worker_count > MAX_WORKER_COUNT {
            bail!(
                "worker_count must be between 1 and {}, got {}",
                MAX_WORKER_COUNT,
                self.worker_count
            );
        }
        if self.ocr_threads == 0 {
            bail!("ocr_threads must be at least 1");
        }
        if self.per_page_timeout_ms == 0 {
            bail!("per_page_timeout_ms must be positive");
        }
        if self.dpi == 0 {
            bail!("dpi must be positive");
        }
        if let Some(fraction) = self.footer_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                bail!("footer_fraction must be within (0, 1], got {fraction}");
            }
        }

        Regex::new(&self.case_pattern).context("failed to compile case_pattern")?;
        let counter = Regex::new(&self.page_counter_pattern)
            .context("failed to compile page_counter_pattern")?;
        if counter.captures_len() < 3 {
            bail!("page_counter_pattern needs two capture groups (ordinal, total)");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_validate() {
        SplitConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_config_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"confidence_threshold": 0.8, "worker_count": 2}}"#).unwrap();

        let config = SplitConfig::load(file.path()).unwrap();
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.ocr_lang, "eng");
        assert_eq!(config.case_pattern, DEFAULT_CASE_PATTERN);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let config = SplitConfig {
            worker_count: MAX_WORKER_COUNT + 1,
            ..SplitConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SplitConfig {
            confidence_threshold: 1.5,
            ..SplitConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SplitConfig {
            case_label_similarity: 1.2,
            ..SplitConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SplitConfig {
            case_label: "  ".to_string(),
            ..SplitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_two_counter_groups() {
        let config = SplitConfig {
            page_counter_pattern: r"page\s+(\d+)".to_string(),
            ..SplitConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("two capture groups"));
    }
}
