use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

use crate::analyze::{format_tenths, round_half_even};

/// Marker printed wherever a ratio has no defined value.
pub const UNDEFINED_MARKER: &str = "undefined";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordStat {
    pub word: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBucket {
    pub name: String,
    pub label: String,
    pub member_words: BTreeSet<String>,
    pub matched_count: usize,
    pub percentage_of_total_tokens: f64,
}

/// Two configured buckets that share member words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketOverlap {
    pub first: String,
    pub second: String,
    pub shared: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatioValue {
    Defined(f64),
    Undefined,
}

impl Serialize for RatioValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RatioValue::Defined(v) => serializer.serialize_f64(*v),
            RatioValue::Undefined => serializer.serialize_str(UNDEFINED_MARKER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedRatio {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    pub numerator_count: usize,
    pub denominator_count: usize,
    pub value: RatioValue,
}

impl DerivedRatio {
    /// One decimal place, ties to even, or the undefined marker.
    pub fn display_value(&self) -> String {
        match self.value {
            RatioValue::Undefined => UNDEFINED_MARKER.to_string(),
            RatioValue::Defined(_) => format_tenths(round_half_even(
                self.numerator_count as u64 * 10,
                self.denominator_count as u64,
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub record_count: usize,
    pub translated_count: usize,
    pub total_tokens: usize,
    pub unique_words: usize,
    pub word_stats: Vec<WordStat>,
    pub category_buckets: Vec<CategoryBucket>,
    pub ratios: Vec<DerivedRatio>,
    pub overlaps: Vec<BucketOverlap>,
}

impl AnalysisResult {
    /// The first `n` ranked words, in table order.
    pub fn top_words(&self, n: usize) -> &[WordStat] {
        &self.word_stats[..n.min(self.word_stats.len())]
    }

    pub fn ratio(&self, name: &str) -> Option<RatioValue> {
        self.ratios.iter().find(|r| r.name == name).map(|r| r.value)
    }

    pub fn bucket(&self, name: &str) -> Option<&CategoryBucket> {
        self.category_buckets.iter().find(|b| b.name == name)
    }

    pub fn bucket_overlaps(&self) -> &[BucketOverlap] {
        &self.overlaps
    }

    pub fn word(&self, word: &str) -> Option<&WordStat> {
        self.word_stats.iter().find(|w| w.word == word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionSource {
    Generated,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub ordinal: usize,
    pub key: String,
    pub title: String,
    pub body: String,
    pub source: SectionSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontMatter {
    pub title: String,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub ordinal: usize,
    pub title: String,
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub front_matter: FrontMatter,
    pub sections: Vec<Section>,
}
