//! Rule-based extraction, the terminal tier.
//!
//! Every rule is a row in [`RULES`]: a target field, a name and a matcher.
//! Fields combine their rules either by taking the first non-empty hit
//! (in table order) or by a de-duplicated union. All functions here are
//! pure and total: any input, including `""`, yields a complete result.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::ExtractionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    WhatDone,
    AiRole,
    Models,
    DataSources,
    Metrics,
}

/// How a field folds the hits of its rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combine {
    FirstHit,
    Union { limit: Option<usize> },
}

impl Field {
    fn combine(&self) -> Combine {
        match self {
            Field::Models => Combine::Union { limit: None },
            Field::Metrics => Combine::Union { limit: Some(5) },
            _ => Combine::FirstHit,
        }
    }
}

pub enum Matcher {
    /// Capture group 1 of the first match.
    Capture(Regex),
    /// Every whole match, in order of appearance.
    FindAll(Regex),
    /// First sentence containing a match.
    SentenceWith(Regex),
    /// First non-empty sentence.
    FirstSentence,
    /// Vocabulary terms present anywhere (case-insensitive), in list order.
    Vocabulary(&'static [&'static str]),
}

pub struct Rule {
    pub field: Field,
    pub name: &'static str,
    pub matcher: Matcher,
}

impl Rule {
    fn new(field: Field, name: &'static str, matcher: Matcher) -> Self {
        Self { field, name, matcher }
    }

    /// Hits of this rule alone, trimmed and non-empty.
    pub fn apply(&self, text: &str) -> Vec<String> {
        let hits: Vec<String> = match &self.matcher {
            Matcher::Capture(re) => re
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| vec![m.as_str().to_string()])
                .unwrap_or_default(),
            Matcher::FindAll(re) => re.find_iter(text).map(|m| m.as_str().to_string()).collect(),
            Matcher::SentenceWith(re) => sentences(text)
                .find(|s| re.is_match(s))
                .map(|s| vec![s.to_string()])
                .unwrap_or_default(),
            Matcher::FirstSentence => sentences(text).next().map(|s| vec![s.to_string()]).unwrap_or_default(),
            Matcher::Vocabulary(terms) => {
                let lower = text.to_lowercase();
                terms
                    .iter()
                    .filter(|t| lower.contains(&t.to_lowercase()))
                    .map(|t| t.to_string())
                    .collect()
            }
        };
        hits.into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect()
    }
}

const METRIC_TERMS: &[&str] = &[
    "accuracy", "precision", "recall", "F1", "AUC", "ROC",
    "sensitivity", "specificity", "AUROC", "RMSE", "MAE",
    "R-squared", "confusion matrix", "performance",
];

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

lazy_static! {
    static ref SENTENCE_BREAK: Regex = re(r"[.!?]+");

    pub static ref RULES: Vec<Rule> = vec![
        // what_done
        Rule::new(Field::WhatDone, "study-subject", Matcher::Capture(re(
            r"(?i)\b(?:we|this study|this work|the study)\s+([^.!?]+(?:investigated|analyzed|evaluated|examined|studied|assessed|compared|proposed|designed|implemented)[^.!?]+)",
        ))),
        Rule::new(Field::WhatDone, "objective-label", Matcher::Capture(re(
            r"(?i)(?:objective|aim|purpose|goal)[^.!?]*?:\s*([^.!?]+)",
        ))),
        Rule::new(Field::WhatDone, "background-label", Matcher::Capture(re(
            r"(?i)(?:background|introduction)[^.!?]*?:\s*([^.!?]+)",
        ))),
        Rule::new(Field::WhatDone, "first-sentence", Matcher::FirstSentence),

        // ai_role: terms match at word starts and ai/ml only as whole words,
        // so "maintained", "detail" or "html" do not select a sentence
        Rule::new(Field::AiRole, "ai-vocabulary", Matcher::SentenceWith(re(
            r"(?i)\b(?:artificial intelligence|machine learning|deep learning|neural network|algorithm|model|prediction|classification|detection|diagnosis|automated)|\b(?:ai|ml)\b",
        ))),

        // models
        Rule::new(Field::Models, "architectures", Matcher::FindAll(re(
            r"(?i)\b(?:CNN|RNN|LSTM|GRU|BERT|GPT|ResNet|VGG|AlexNet|Inception|MobileNet|EfficientNet)\b",
        ))),
        Rule::new(Field::Models, "classical-ml", Matcher::FindAll(re(
            r"(?i)\b(?:random forest|decision tree|support vector machine|SVM|logistic regression|linear regression)\b",
        ))),
        Rule::new(Field::Models, "boosting", Matcher::FindAll(re(
            r"(?i)\b(?:gradient boosting|XGBoost|LightGBM|CatBoost)\b",
        ))),
        Rule::new(Field::Models, "unsupervised", Matcher::FindAll(re(
            r"(?i)\b(?:k-means|clustering|PCA)\b",
        ))),

        // data_sources
        Rule::new(Field::DataSources, "dataset-phrase", Matcher::Capture(re(
            r"(?i)(?:dataset|data set|database|cohort|registry)[^.!?]*?(?:of|from|with)\s+([^.!?]{10,80})",
        ))),
        Rule::new(Field::DataSources, "named-dataset", Matcher::Capture(re(
            r"(?i)(?:using|from)\s+(?:the\s+)?([A-Z][A-Za-z\s]+(?:dataset|database|registry|cohort))",
        ))),

        // metrics
        Rule::new(Field::Metrics, "metric-vocabulary", Matcher::Vocabulary(METRIC_TERMS)),
    ];
}

/// Sentences split on runs of `.`, `!`, `?`; trimmed, empties skipped.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    SENTENCE_BREAK.split(text).map(str::trim).filter(|s| !s.is_empty())
}

/// Value of one field under the rule table.
pub fn extract_field(field: Field, text: &str) -> String {
    let rules = RULES.iter().filter(|r| r.field == field);
    match field.combine() {
        Combine::FirstHit => rules
            .map(|r| r.apply(text))
            .find(|hits| !hits.is_empty())
            .and_then(|hits| hits.into_iter().next())
            .unwrap_or_default(),
        Combine::Union { limit } => {
            let mut seen: Vec<String> = Vec::new();
            for hit in rules.flat_map(|r| r.apply(text)) {
                if !seen.iter().any(|s| s.eq_ignore_ascii_case(&hit)) {
                    seen.push(hit);
                }
            }
            if let Some(limit) = limit {
                seen.truncate(limit);
            }
            seen.join(", ")
        }
    }
}

/// Full heuristic extraction, length-capped.
pub fn extract(text: &str) -> ExtractionResult {
    ExtractionResult {
        what_done: extract_field(Field::WhatDone, text),
        ai_role: extract_field(Field::AiRole, text),
        models: extract_field(Field::Models, text),
        data_sources: extract_field(Field::DataSources, text),
        metrics: extract_field(Field::Metrics, text),
    }
    .capped()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CAP_LONG, CAP_SHORT};

    const ABSTRACT: &str = "Background: Sepsis is a leading cause of ICU mortality. \
        We developed and evaluated a deep learning model to predict sepsis onset. \
        A CNN and an LSTM were trained on the dataset from the MIMIC-IV critical care database. \
        Random forest and SVM were also evaluated as baselines. \
        The model achieved an AUC of 0.98 and 95% accuracy.";

    #[test]
    fn test_rule_names_are_unique() {
        let mut names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }

    #[test]
    fn test_what_done_prefers_study_subject() {
        let got = extract_field(Field::WhatDone, ABSTRACT);
        assert!(got.starts_with("developed and evaluated a deep learning model"), "got {got:?}");
    }

    #[test]
    fn test_what_done_objective_label() {
        let text = "Objective: to quantify tumour margins in histology slides. Methods follow.";
        assert_eq!(extract_field(Field::WhatDone, text), "to quantify tumour margins in histology slides");
    }

    #[test]
    fn test_what_done_first_sentence_fallback() {
        assert_eq!(extract_field(Field::WhatDone, "Cells divide. Then more."), "Cells divide");
    }

    #[test]
    fn test_ai_role_first_matching_sentence() {
        let text = "Hospitals are busy. Our AI triages chest films. Machine learning helps too.";
        assert_eq!(extract_field(Field::AiRole, text), "Our AI triages chest films");
    }

    #[test]
    fn test_ai_role_ignores_substrings() {
        // "ai" inside "main" and "ml" inside "html" must not count
        assert_eq!(extract_field(Field::AiRole, "The main html page loads. Nothing else."), "");
    }

    #[test]
    fn test_models_union_is_deduplicated() {
        let got = extract_field(Field::Models, "A cnn beat the CNN baseline and XGBoost. CNN again.");
        assert_eq!(got, "cnn, XGBoost");
    }

    #[test]
    fn test_models_from_sample() {
        let got = extract_field(Field::Models, ABSTRACT).to_lowercase();
        for expected in ["cnn", "lstm", "random forest", "svm"] {
            assert!(got.contains(expected), "missing {expected} in {got}");
        }
    }

    #[test]
    fn test_data_sources_phrase() {
        let got = extract_field(Field::DataSources, ABSTRACT);
        assert!(got.contains("MIMIC-IV"), "got {got:?}");
    }

    #[test]
    fn test_metrics_in_vocabulary_order_and_capped() {
        let text = "performance, RMSE, MAE, recall, precision, accuracy and AUC were reported";
        assert_eq!(extract_field(Field::Metrics, text), "accuracy, precision, recall, AUC, RMSE");
    }

    #[test]
    fn test_empty_input_is_complete_and_empty() {
        assert_eq!(extract(""), ExtractionResult::default());
    }

    #[test]
    fn test_caps_hold_for_huge_input() {
        let huge = format!("We evaluated {} model.", "very ".repeat(5000));
        let r = extract(&huge);
        assert!(r.what_done.chars().count() <= CAP_LONG);
        assert!(r.ai_role.chars().count() <= CAP_LONG);
        assert!(r.models.chars().count() <= CAP_SHORT);
        assert!(r.data_sources.chars().count() <= CAP_SHORT);
        assert!(r.metrics.chars().count() <= CAP_SHORT);
    }
}
