use anyhow::{Context, Result};
use regex::Regex;
use strsim::normalized_levenshtein;

use crate::config::SplitConfig;
use crate::model::{ExtractedMarkers, MatchQuality, PageRecord};

const CASE_VALUE_PATTERN: &str = r"(?i)^\s*[:#]?\s*([0-9A-Z|]+(?:\s*[-–—‐]\s*[0-9A-Z|]+)*)";

#[derive(Debug, Clone)]
pub struct PatternExtractor {
    case_pattern: Regex,
    counter_pattern: Regex,
    case_value: Regex,
    case_label: String,
    case_label_similarity: f64,
    confidence_threshold: f32,
}

impl PatternExtractor {
    pub fn new(config: &SplitConfig) -> Result<Self> {
        Ok(Self {
            case_pattern: Regex::new(&config.case_pattern)
                .context("failed to compile case_pattern")?,
            counter_pattern: Regex::new(&config.page_counter_pattern)
                .context("failed to compile page_counter_pattern")?,
            case_value: Regex::new(CASE_VALUE_PATTERN)
                .context("failed to compile case value regex")?,
            case_label: normalize_label(&config.case_label),
            case_label_similarity: config.case_label_similarity,
            confidence_threshold: config.confidence_threshold,
        })
    }

    pub fn extract(&self, page: &PageRecord) -> ExtractedMarkers {
        let case_id = self.detect_case_id(&page.raw_text);
        let counter = self.detect_page_counter(&page.raw_text);
        if case_id.is_none() && counter.is_none() {
            return ExtractedMarkers::none();
        }

        let match_quality = match (&case_id, counter) {
            (Some(_), Some(_)) if page.confidence > self.confidence_threshold => {
                MatchQuality::Strong
            }
            _ => MatchQuality::Weak,
        };

        ExtractedMarkers {
            case_id,
            page_ordinal: counter.map(|(ordinal, _)| ordinal),
            page_total: counter.map(|(_, total)| total),
            match_quality,
        }
    }

    fn case_candidates(&self, text: &str) -> Vec<String> {
        let mut candidates = Vec::<String>::new();
        for captures in self.case_pattern.captures_iter(text) {
            let Some(found) = captures.get(1).or_else(|| captures.get(0)) else {
                continue;
            };
            let normalized = normalize_case_text(found.as_str());
            if normalized.is_empty() || !normalized.chars().any(|ch| ch.is_ascii_digit()) {
                continue;
            }
            if !candidates.contains(&normalized) {
                candidates.push(normalized);
            }
        }
        candidates
    }

    // Fallback for labels garbled by OCR ("Casc Nunber:"). The words right
    // before the first `:` or `#` on a line are scored against `case_label`;
    // the best line at or above the threshold supplies the value.
    fn fuzzy_case_candidate(&self, text: &str) -> Option<String> {
        let label_words = self.case_label.split_whitespace().count().max(1);
        let mut best: Option<(f64, String)> = None;

        for line in text.lines() {
            let Some(split) = line.find([':', '#']) else {
                continue;
            };
            let (label, value) = line.split_at(split);
            let words = normalize_label(label)
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>();
            if words.is_empty() {
                continue;
            }
            let tail = words[words.len().saturating_sub(label_words)..].join(" ");
            let score = normalized_levenshtein(&tail, &self.case_label);
            if score < self.case_label_similarity {
                continue;
            }
            if best.as_ref().is_some_and(|(best_score, _)| *best_score >= score) {
                continue;
            }

            let Some(found) = self
                .case_value
                .captures(&value[1..])
                .and_then(|captures| captures.get(1))
            else {
                continue;
            };
            let normalized = normalize_case_text(found.as_str());
            if normalized.chars().any(|ch| ch.is_ascii_digit()) {
                best = Some((score, normalized));
            }
        }

        best.map(|(_, candidate)| candidate)
    }

    fn detect_case_id(&self, text: &str) -> Option<String> {
        let mut candidates = self.case_candidates(text);
        if candidates.is_empty() {
            candidates.extend(self.fuzzy_case_candidate(text));
        }
        let first = candidates.first()?;
        let folded = fold_confusables(first);

        let ambiguous = candidates
            .iter()
            .skip(1)
            .any(|other| fold_confusables(other) == folded);

        if ambiguous {
            Some(first.clone())
        } else {
            Some(folded)
        }
    }

    fn detect_page_counter(&self, text: &str) -> Option<(u32, u32)> {
        self.counter_pattern
            .captures_iter(text)
            .find_map(|captures| {
                let ordinal = parse_counter_number(captures.get(1)?.as_str())?;
                let total = parse_counter_number(captures.get(2)?.as_str())?;
                Some((ordinal, total))
            })
    }
}

pub fn normalize_case_text(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    for character in raw.chars() {
        if character.is_whitespace() {
            continue;
        }
        let character = match character {
            '–' | '—' | '‐' | '‑' | '−' => '-',
            other => other,
        };
        if character == '-' && normalized.ends_with('-') {
            continue;
        }
        normalized.extend(character.to_uppercase());
    }

    normalized
        .trim_matches(|character: char| !character.is_ascii_alphanumeric() && character != '|')
        .to_string()
}

/// Reads `O` as `0` and `I`/`L`/`|` as `1` inside a hyphen-separated token
/// that is otherwise all digits. Tokens carrying any other letter are real
/// alphanumerics (`24BK001`, `5D23`) and stay as printed.
pub fn fold_confusables(case_id: &str) -> String {
    case_id
        .split('-')
        .map(|token| {
            let numeric = token.chars().any(|ch| ch.is_ascii_digit())
                && token
                    .chars()
                    .all(|ch| ch.is_ascii_digit() || matches!(ch, 'O' | 'I' | 'L' | '|'));
            if !numeric {
                return token.to_string();
            }
            token
                .chars()
                .map(|character| match character {
                    'O' => '0',
                    'I' | 'L' | '|' => '1',
                    other => other,
                })
                .collect::<String>()
        })
        .collect::<Vec<String>>()
        .join("-")
}

fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_counter_number(raw: &str) -> Option<u32> {
    let digits = raw
        .chars()
        .map(|character| match character {
            'O' | 'o' => '0',
            'I' | 'i' | 'l' | 'L' | '|' => '1',
            other => other,
        })
        .collect::<String>();

    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }

    digits.parse::<u32>().ok().filter(|value| *value > 0)
}
