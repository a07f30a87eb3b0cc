//! Output matching and quality scoring.
//!
//! Scores computed here are pure functions of the case results, the dataset
//! and the configured weights, so re-scoring the same results always yields
//! the same metrics.

use std::collections::{BTreeMap, HashSet};

use crate::domain::models::{
    CaseResult, FailingCase, MatchMethod, MatchingConfig, QualityMetrics, ScoringConfig, TestCase,
};

/// Metrics plus the failures that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    /// Aggregate scores
    pub metrics: QualityMetrics,
    /// Unmatched cases in case order
    pub failing_cases: Vec<FailingCase>,
}

/// Compares outputs and aggregates per-run quality metrics.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    matching: MatchingConfig,
    scoring: ScoringConfig,
}

impl QualityScorer {
    /// Scorer with the given matching and weighting rules.
    pub fn new(matching: MatchingConfig, scoring: ScoringConfig) -> Self {
        Self { matching, scoring }
    }

    /// Matching method in use.
    pub const fn method(&self) -> MatchMethod {
        self.matching.method
    }

    /// Whether `generated` matches `expected` under the configured method.
    pub fn matches(&self, generated: &str, expected: &str) -> bool {
        self.matches_with(generated, expected, self.matching.method)
    }

    /// Whether `generated` matches `expected` under an explicit method.
    pub fn matches_with(&self, generated: &str, expected: &str, method: MatchMethod) -> bool {
        let generated = normalize(generated, self.matching.case_sensitive);
        let expected = normalize(expected, self.matching.case_sensitive);

        match method {
            MatchMethod::Exact => generated == expected,
            MatchMethod::Contains => generated.contains(&expected),
            MatchMethod::Fuzzy => {
                similarity(&generated, &expected) >= self.matching.fuzzy_threshold
            }
        }
    }

    /// Score one run.
    ///
    /// `repeats` holds the results of earlier runs of the same candidate on
    /// the same dataset; they only influence the consistency score.
    pub fn score(
        &self,
        results: &[CaseResult],
        cases: &[TestCase],
        repeats: &[&[CaseResult]],
    ) -> ScoreReport {
        let total = results.len();
        let matched = results.iter().filter(|r| r.matched).count();
        let success_rate = percentage(matched, total);

        let consistency_score = self
            .consistency(results, cases, repeats)
            .unwrap_or(success_rate);
        let robustness_score = self.robustness(results, cases).unwrap_or(success_rate);

        let weights = &self.scoring.weights;
        let overall_quality = (weights.success_rate * success_rate
            + weights.consistency * consistency_score
            + weights.robustness * robustness_score)
            / weights.total();

        let failing_cases = results
            .iter()
            .filter(|r| !r.matched)
            .map(|r| failing_case(r, cases))
            .collect();

        ScoreReport {
            metrics: QualityMetrics {
                success_rate,
                consistency_score,
                robustness_score,
                overall_quality: overall_quality.clamp(0.0, 100.0),
                matched_cases: matched,
                total_cases: total,
            },
            failing_cases,
        }
    }

    /// Agreement of outcomes that should agree; `None` without any such group.
    fn consistency(
        &self,
        results: &[CaseResult],
        cases: &[TestCase],
        repeats: &[&[CaseResult]],
    ) -> Option<f64> {
        let mut groups: Vec<Vec<bool>> = Vec::new();

        // Identical inputs inside the run
        let mut by_input: BTreeMap<String, Vec<bool>> = BTreeMap::new();
        for result in results {
            if let Some(case) = cases.get(result.case_index) {
                by_input
                    .entry(normalize(&case.input, self.matching.case_sensitive))
                    .or_default()
                    .push(result.matched);
            }
        }
        groups.extend(by_input.into_values().filter(|g| g.len() >= 2));

        // The same case across repeated runs
        if !repeats.is_empty() {
            let mut by_case: BTreeMap<usize, Vec<bool>> = results
                .iter()
                .map(|r| (r.case_index, vec![r.matched]))
                .collect();
            for run in repeats {
                for result in *run {
                    if let Some(outcomes) = by_case.get_mut(&result.case_index) {
                        outcomes.push(result.matched);
                    }
                }
            }
            groups.extend(by_case.into_values().filter(|g| g.len() >= 2));
        }

        if groups.is_empty() {
            return None;
        }

        let disagreement: f64 = groups
            .iter()
            .map(|outcomes| {
                let p = outcomes.iter().filter(|&&m| m).count() as f64 / outcomes.len() as f64;
                4.0 * p * (1.0 - p)
            })
            .sum::<f64>()
            / groups.len() as f64;

        Some(100.0 * (1.0 - disagreement))
    }

    /// Success rate over edge-case inputs; `None` if there are none.
    fn robustness(&self, results: &[CaseResult], cases: &[TestCase]) -> Option<f64> {
        let edge_cases = self.edge_case_indices(cases);
        if edge_cases.is_empty() {
            return None;
        }

        let outcomes: Vec<bool> = results
            .iter()
            .filter(|r| edge_cases.contains(&r.case_index))
            .map(|r| r.matched)
            .collect();
        if outcomes.is_empty() {
            return None;
        }

        let matched = outcomes.iter().filter(|&&m| m).count();
        Some(percentage(matched, outcomes.len()))
    }

    fn edge_case_indices(&self, cases: &[TestCase]) -> HashSet<usize> {
        if !self.scoring.edge_case_indices.is_empty() {
            return self
                .scoring
                .edge_case_indices
                .iter()
                .copied()
                .filter(|&i| i < cases.len())
                .collect();
        }

        cases
            .iter()
            .enumerate()
            .filter(|(_, case)| self.is_edge_case(case))
            .map(|(i, _)| i)
            .collect()
    }

    /// Inputs of at most `edge_case_max_words` words.
    pub fn is_edge_case(&self, case: &TestCase) -> bool {
        case.input_word_count() <= self.scoring.edge_case_max_words
    }
}

fn failing_case(result: &CaseResult, cases: &[TestCase]) -> FailingCase {
    let case = cases.get(result.case_index);
    FailingCase {
        case_index: result.case_index,
        input: case.map(|c| c.input.clone()).unwrap_or_default(),
        expected: case.map(|c| c.expected_output.clone()).unwrap_or_default(),
        actual: result.generated_output.clone(),
        reason: case.and_then(|c| c.reason.clone()),
        error: result.error.clone(),
    }
}

/// Trim, collapse whitespace runs and optionally fold case.
pub fn normalize(text: &str, case_sensitive: bool) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if case_sensitive {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

/// Normalized Levenshtein similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
