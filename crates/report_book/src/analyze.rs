use std::collections::{BTreeSet, HashMap};

use corpus_store::Record;
use thiserror::Error;

use crate::config::{BucketSpec, RatioSpec, ReportConfig};
use crate::model::{AnalysisResult, BucketOverlap, CategoryBucket, DerivedRatio, RatioValue, WordStat};

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("duplicate bucket name `{name}`")]
    DuplicateBucket { name: String },
    #[error("ratio `{ratio}` references unknown bucket `{bucket}`")]
    UnknownBucket { ratio: String, bucket: String },
}

/// Lower-cases and trims non-alphanumeric characters from both edges.
/// Returns `None` when nothing is left.
pub fn normalize_token(raw: &str) -> Option<String> {
    let lowered = raw.to_lowercase();
    let trimmed = lowered.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().filter_map(normalize_token).collect()
}

/// `numerator / denominator` rounded to an integer, ties to even.
/// A zero denominator yields zero.
pub fn round_half_even(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    let quotient = numerator / denominator;
    let twice_rem = (numerator % denominator) * 2;
    if twice_rem > denominator || (twice_rem == denominator && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}

pub fn format_tenths(tenths: u64) -> String {
    format!("{}.{}", tenths / 10, tenths % 10)
}

/// Share of `total` in percent, one decimal place.
pub fn percentage(count: usize, total: usize) -> f64 {
    round_half_even(count as u64 * 1000, total as u64) as f64 / 10.0
}

pub fn format_percentage(count: usize, total: usize) -> String {
    format_tenths(round_half_even(count as u64 * 1000, total as u64))
}

#[derive(Debug, Clone)]
struct BucketRule {
    name: String,
    label: String,
    members: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    buckets: Vec<BucketRule>,
    ratios: Vec<RatioSpec>,
}

impl Analyzer {
    pub fn new(buckets: &[BucketSpec], ratios: &[RatioSpec]) -> Result<Analyzer, AnalyzeError> {
        let mut rules: Vec<BucketRule> = Vec::with_capacity(buckets.len());
        for spec in buckets {
            if rules.iter().any(|r| r.name == spec.name) {
                return Err(AnalyzeError::DuplicateBucket {
                    name: spec.name.clone(),
                });
            }
            rules.push(BucketRule {
                name: spec.name.clone(),
                label: spec.display_label().to_string(),
                members: spec.members.iter().filter_map(|m| normalize_token(m)).collect(),
            });
        }
        for ratio in ratios {
            for side in [&ratio.numerator, &ratio.denominator] {
                if !rules.iter().any(|r| &r.name == side) {
                    return Err(AnalyzeError::UnknownBucket {
                        ratio: ratio.name.clone(),
                        bucket: side.clone(),
                    });
                }
            }
        }
        Ok(Analyzer {
            buckets: rules,
            ratios: ratios.to_vec(),
        })
    }

    pub fn from_config(config: &ReportConfig) -> Result<Analyzer, AnalyzeError> {
        Analyzer::new(&config.buckets, &config.ratios)
    }

    pub fn analyze(&self, records: &[Record]) -> AnalysisResult {
        // First-occurrence order is kept so the stable sort below breaks ties by it.
        let mut table: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut total_tokens = 0usize;
        for record in records {
            for token in tokenize(&record.translation_text) {
                total_tokens += 1;
                match index.get(&token) {
                    Some(&slot) => table[slot].1 += 1,
                    None => {
                        index.insert(token.clone(), table.len());
                        table.push((token, 1));
                    }
                }
            }
        }
        let counts: HashMap<&str, usize> = table.iter().map(|(w, c)| (w.as_str(), *c)).collect();

        let category_buckets: Vec<CategoryBucket> = self
            .buckets
            .iter()
            .map(|rule| {
                let matched: usize = rule
                    .members
                    .iter()
                    .filter_map(|m| counts.get(m.as_str()))
                    .sum();
                CategoryBucket {
                    name: rule.name.clone(),
                    label: rule.label.clone(),
                    member_words: rule.members.clone(),
                    matched_count: matched,
                    percentage_of_total_tokens: percentage(matched, total_tokens),
                }
            })
            .collect();

        let ratios = self
            .ratios
            .iter()
            .map(|spec| derive_ratio(spec, &category_buckets))
            .collect();

        let mut ranked = table;
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let word_stats: Vec<WordStat> = ranked
            .into_iter()
            .map(|(word, count)| WordStat {
                percentage: percentage(count, total_tokens),
                word,
                count,
            })
            .collect();

        let result = AnalysisResult {
            record_count: records.len(),
            translated_count: records.iter().filter(|r| r.has_translation()).count(),
            total_tokens,
            unique_words: word_stats.len(),
            word_stats,
            category_buckets,
            ratios,
            overlaps: self.overlaps(),
        };
        tracing::info!(
            records = result.record_count,
            tokens = result.total_tokens,
            unique = result.unique_words,
            buckets = result.category_buckets.len(),
            "analysis complete"
        );
        result
    }

    fn overlaps(&self) -> Vec<BucketOverlap> {
        let mut out = Vec::new();
        for (i, first) in self.buckets.iter().enumerate() {
            for second in &self.buckets[i + 1..] {
                let shared: Vec<String> = first
                    .members
                    .intersection(&second.members)
                    .cloned()
                    .collect();
                if !shared.is_empty() {
                    tracing::debug!(first = %first.name, second = %second.name, shared = shared.len(), "bucket overlap");
                    out.push(BucketOverlap {
                        first: first.name.clone(),
                        second: second.name.clone(),
                        shared,
                    });
                }
            }
        }
        out
    }
}

fn derive_ratio(spec: &RatioSpec, buckets: &[CategoryBucket]) -> DerivedRatio {
    let count_of = |name: &str| {
        buckets
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.matched_count)
            .unwrap_or(0)
    };
    let numerator_count = count_of(&spec.numerator);
    let denominator_count = count_of(&spec.denominator);
    let value = if denominator_count == 0 {
        tracing::warn!(
            ratio = %spec.name,
            denominator = %spec.denominator,
            "ratio undefined: denominator bucket matched no tokens"
        );
        RatioValue::Undefined
    } else {
        RatioValue::Defined(numerator_count as f64 / denominator_count as f64)
    };
    DerivedRatio {
        name: spec.name.clone(),
        numerator: spec.numerator.clone(),
        denominator: spec.denominator.clone(),
        numerator_count,
        denominator_count,
        value,
    }
}
