//! Rule-based comparison of a batch of candidate evaluations.
//!
//! Everything here is deterministic: the same inputs always produce the same
//! rankings and the same explanatory text.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::scoring::CriterionEvaluation;

/// Standard deviation below which scores count as consistent.
const CONSISTENT_SIGMA: f64 = 0.3;
/// Standard deviation above which scores count as polarized.
const POLARIZED_SIGMA: f64 = 1.0;
const HIGH_SCORE: f64 = 4.0;
const LOW_SCORE: f64 = 2.5;

/// A candidate's scored criteria, as stored in `individual_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub candidate_id: String,
    #[serde(default)]
    pub candidate_name: String,
    pub overall_score: f64,
    #[serde(default)]
    pub criteria_evaluations: Vec<CriterionEvaluation>,
}

impl CandidateEvaluation {
    fn scores(&self) -> Vec<f64> {
        self.criteria_evaluations.iter().map(|c| c.score).collect()
    }

    fn breakdown(&self) -> BTreeMap<String, f64> {
        self.criteria_evaluations
            .iter()
            .map(|c| (c.criterion_name.clone(), c.score))
            .collect()
    }

    /// `(name, score)` pairs, best first.
    fn sorted_criteria(&self) -> Vec<(&str, f64)> {
        let mut pairs: Vec<(&str, f64)> = self
            .criteria_evaluations
            .iter()
            .map(|c| (c.criterion_name.as_str(), c.score))
            .collect();
        pairs.sort_by(|a, b| desc(a.1, b.1));
        pairs
    }
}

/// How a batch is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    /// Highest weighted overall score first.
    #[default]
    OverallScore,
    /// Smallest spread across criteria first.
    Consistency,
    /// Best single criterion first, with a bonus for every high score.
    PeakPerformance,
    /// Good average, low spread and no very weak criterion.
    Balanced,
}

impl RankingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OverallScore => "overall_score",
            Self::Consistency => "consistency",
            Self::PeakPerformance => "peak_performance",
            Self::Balanced => "balanced",
        }
    }
}

impl FromStr for RankingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overall_score" => Ok(Self::OverallScore),
            "consistency" => Ok(Self::Consistency),
            "peak_performance" => Ok(Self::PeakPerformance),
            "balanced" => Ok(Self::Balanced),
            other => Err(format!("unknown ranking strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    Consistent,
    Varied,
    Polarized,
}

impl PerformanceTrend {
    fn from_sigma(sigma: f64) -> Self {
        if sigma < CONSISTENT_SIGMA {
            Self::Consistent
        } else if sigma > POLARIZED_SIGMA {
            Self::Polarized
        } else {
            Self::Varied
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub mean_score: f64,
    pub median_score: f64,
    pub std_deviation: f64,
    pub score_range: (f64, f64),
    /// Candidates more than one standard deviation from the mean.
    pub outliers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaAnalysis {
    pub criterion_name: String,
    pub best_candidate_id: String,
    pub worst_candidate_id: String,
    pub score_spread: f64,
    pub average_score: f64,
    pub performance_trend: PerformanceTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRanking {
    pub candidate_id: String,
    pub rank: u32,
    pub overall_score: f64,
    pub key_strengths: Vec<String>,
    pub key_weaknesses: Vec<String>,
    pub score_breakdown: BTreeMap<String, f64>,
}

/// Result of [`analyze`]; stored as `comparison_summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub best_candidate: CandidateRanking,
    pub rankings: Vec<CandidateRanking>,
    pub statistical_summary: StatisticalSummary,
    pub criteria_analysis: Vec<CriteriaAnalysis>,
    pub cross_candidate_insights: String,
    pub recommendation_rationale: String,
    pub ranking_strategy: RankingStrategy,
    pub analysis_method: String,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation; 0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub fn statistical_summary(results: &[CandidateEvaluation]) -> StatisticalSummary {
    let scores: Vec<f64> = results.iter().map(|r| r.overall_score).collect();
    let mean_score = mean(&scores);
    let sigma = std_dev(&scores);
    let outliers = if sigma > 0.0 {
        results
            .iter()
            .filter(|r| (r.overall_score - mean_score).abs() > sigma)
            .map(|r| r.candidate_id.clone())
            .collect()
    } else {
        Vec::new()
    };
    StatisticalSummary {
        mean_score,
        median_score: median(&scores),
        std_deviation: sigma,
        score_range: if scores.is_empty() {
            (0.0, 0.0)
        } else {
            (min_of(&scores), max_of(&scores))
        },
        outliers,
    }
}

/// Per-criterion comparison, in order of first appearance.
pub fn criteria_analysis(results: &[CandidateEvaluation]) -> Vec<CriteriaAnalysis> {
    let mut grouped: Vec<(String, Vec<(String, f64)>)> = Vec::new();
    for result in results {
        for criterion in &result.criteria_evaluations {
            let slot = match grouped
                .iter()
                .position(|(name, _)| *name == criterion.criterion_name)
            {
                Some(idx) => idx,
                None => {
                    grouped.push((criterion.criterion_name.clone(), Vec::new()));
                    grouped.len() - 1
                }
            };
            grouped[slot]
                .1
                .push((result.candidate_id.clone(), criterion.score));
        }
    }

    grouped
        .into_iter()
        .filter(|(_, entries)| !entries.is_empty())
        .map(|(criterion_name, entries)| {
            let scores: Vec<f64> = entries.iter().map(|(_, s)| *s).collect();
            // First occurrence wins ties on both ends.
            let mut best = &entries[0];
            let mut worst = &entries[0];
            for entry in &entries[1..] {
                if entry.1 > best.1 {
                    best = entry;
                }
                if entry.1 < worst.1 {
                    worst = entry;
                }
            }
            CriteriaAnalysis {
                best_candidate_id: best.0.clone(),
                worst_candidate_id: worst.0.clone(),
                score_spread: max_of(&scores) - min_of(&scores),
                average_score: mean(&scores),
                performance_trend: PerformanceTrend::from_sigma(std_dev(&scores)),
                criterion_name,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

fn labelled(pairs: &[(&str, f64)]) -> Vec<String> {
    pairs
        .iter()
        .map(|(name, score)| format!("{} ({:.1})", name, score))
        .collect()
}

/// Order by `metric` (higher first, stable) and build rankings with the
/// strengths and weaknesses produced by `describe`.
fn rank_by<M, D>(results: &[CandidateEvaluation], metric: M, describe: D) -> Vec<CandidateRanking>
where
    M: Fn(&CandidateEvaluation) -> f64,
    D: Fn(&CandidateEvaluation, f64) -> (Vec<String>, Vec<String>),
{
    let mut scored: Vec<(&CandidateEvaluation, f64)> =
        results.iter().map(|r| (r, metric(r))).collect();
    scored.sort_by(|a, b| desc(a.1, b.1));

    scored
        .into_iter()
        .enumerate()
        .map(|(idx, (result, value))| {
            let (key_strengths, key_weaknesses) = describe(result, value);
            CandidateRanking {
                candidate_id: result.candidate_id.clone(),
                rank: idx as u32 + 1,
                overall_score: result.overall_score,
                key_strengths,
                key_weaknesses,
                score_breakdown: result.breakdown(),
            }
        })
        .collect()
}

fn rank_by_overall_score(results: &[CandidateEvaluation]) -> Vec<CandidateRanking> {
    rank_by(
        results,
        |r| r.overall_score,
        |r, _| {
            let sorted = r.sorted_criteria();
            let top: Vec<_> = sorted.iter().take(3).filter(|(_, s)| *s >= HIGH_SCORE).copied().collect();
            let tail = &sorted[sorted.len().saturating_sub(3)..];
            let bottom: Vec<_> = tail.iter().filter(|(_, s)| *s <= LOW_SCORE).copied().collect();
            (labelled(&top), labelled(&bottom))
        },
    )
}

fn rank_by_consistency(results: &[CandidateEvaluation]) -> Vec<CandidateRanking> {
    rank_by(
        results,
        |r| 5.0 - std_dev(&r.scores()),
        |r, consistency| {
            let sigma = std_dev(&r.scores());
            let mut strengths = vec![format!("Consistent performance (σ={:.2})", sigma)];
            if consistency > 4.0 {
                strengths.push("Very stable across criteria".to_string());
            }
            let mut weaknesses = Vec::new();
            if sigma > POLARIZED_SIGMA {
                weaknesses.push("High variability across criteria".to_string());
            }
            (strengths, weaknesses)
        },
    )
}

fn peak_metric(r: &CandidateEvaluation) -> f64 {
    let scores = r.scores();
    let peak = if scores.is_empty() { 0.0 } else { max_of(&scores) };
    let high = scores.iter().filter(|s| **s >= HIGH_SCORE).count();
    peak + high as f64 * 0.1
}

fn rank_by_peak_performance(results: &[CandidateEvaluation]) -> Vec<CandidateRanking> {
    rank_by(results, peak_metric, |r, _| {
        let scores = r.scores();
        let peak = if scores.is_empty() { 0.0 } else { max_of(&scores) };
        let high = scores.iter().filter(|s| **s >= HIGH_SCORE).count();
        let sorted = r.sorted_criteria();

        let mut strengths = vec![format!("Peak score: {:.1}", peak)];
        if high > 1 {
            strengths.push(format!("{} criteria above 4.0", high));
        }
        let top: Vec<_> = sorted.iter().take(2).filter(|(_, s)| *s >= HIGH_SCORE).copied().collect();
        strengths.extend(labelled(&top));

        let tail = &sorted[sorted.len().saturating_sub(2)..];
        let bottom: Vec<_> = tail.iter().filter(|(_, s)| *s <= LOW_SCORE).copied().collect();
        (strengths, labelled(&bottom))
    })
}

fn balance_metric(r: &CandidateEvaluation) -> f64 {
    let scores = r.scores();
    if scores.is_empty() {
        return 0.0;
    }
    mean(&scores) - std_dev(&scores) * 0.5 - (2.0 - min_of(&scores)).max(0.0)
}

fn rank_by_balanced(results: &[CandidateEvaluation]) -> Vec<CandidateRanking> {
    rank_by(results, balance_metric, |r, _| {
        let scores = r.scores();
        if scores.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let sigma = std_dev(&scores);
        let below = scores.iter().filter(|s| **s < 3.0).count();

        let mut strengths = Vec::new();
        if sigma < 0.5 {
            strengths.push("Very balanced performance".to_string());
        } else if sigma < 1.0 {
            strengths.push("Balanced performance".to_string());
        }
        if below == 0 {
            strengths.push("No weak criteria".to_string());
        }

        let mut weaknesses = Vec::new();
        if below > 0 {
            weaknesses.push(format!("{} criteria below 3.0", below));
        }
        if sigma > 1.0 {
            weaknesses.push("Uneven performance".to_string());
        }
        (strengths, weaknesses)
    })
}

pub fn rank(results: &[CandidateEvaluation], strategy: RankingStrategy) -> Vec<CandidateRanking> {
    match strategy {
        RankingStrategy::OverallScore => rank_by_overall_score(results),
        RankingStrategy::Consistency => rank_by_consistency(results),
        RankingStrategy::PeakPerformance => rank_by_peak_performance(results),
        RankingStrategy::Balanced => rank_by_balanced(results),
    }
}

// ---------------------------------------------------------------------------
// Narrative
// ---------------------------------------------------------------------------

fn names_of<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = &'a CriteriaAnalysis>,
{
    items
        .into_iter()
        .map(|c| c.criterion_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn cross_candidate_insights(
    results: &[CandidateEvaluation],
    analysis: &[CriteriaAnalysis],
    stats: &StatisticalSummary,
) -> String {
    let mut insights = Vec::new();

    if stats.std_deviation < CONSISTENT_SIGMA {
        insights.push("Candidates show very similar performance levels".to_string());
    } else if stats.std_deviation > POLARIZED_SIGMA {
        insights.push("Significant performance variation between candidates".to_string());
    }

    let weak: Vec<_> = analysis.iter().filter(|c| c.average_score < LOW_SCORE).collect();
    let strong: Vec<_> = analysis.iter().filter(|c| c.average_score > HIGH_SCORE).collect();
    let varied: Vec<_> = analysis.iter().filter(|c| c.score_spread > 1.5).collect();
    if !weak.is_empty() {
        insights.push(format!("All candidates struggle with: {}", names_of(weak)));
    }
    if !strong.is_empty() {
        insights.push(format!("All candidates excel at: {}", names_of(strong)));
    }
    if !varied.is_empty() {
        insights.push(format!("High variation in: {}", names_of(varied)));
    }

    let n = results.len() as f64;
    let high = results.iter().filter(|r| r.overall_score >= HIGH_SCORE).count() as f64;
    let low = results.iter().filter(|r| r.overall_score <= LOW_SCORE).count() as f64;
    if high > n * 0.6 {
        insights.push("Most candidates meet high quality standards".to_string());
    } else if low > n * 0.4 {
        insights.push("Many candidates need significant improvement".to_string());
    }

    if insights.is_empty() {
        insights.push("Candidates show typical performance distribution".to_string());
    }
    insights.join("; ")
}

pub fn recommendation_rationale(winner: &CandidateRanking, analysis: &[CriteriaAnalysis]) -> String {
    let mut reasons = Vec::new();
    let score = winner.overall_score;
    let label = if score >= 4.5 {
        "Exceptional overall performance"
    } else if score >= 4.0 {
        "Strong overall performance"
    } else if score >= 3.5 {
        "Good overall performance"
    } else {
        "Best available option"
    };
    reasons.push(format!("{} ({:.1}/5.0)", label, score));

    let led: Vec<_> = analysis
        .iter()
        .filter(|c| c.best_candidate_id == winner.candidate_id)
        .collect();
    if !led.is_empty() {
        if led.len() as f64 >= analysis.len() as f64 * 0.6 {
            reasons.push(format!("Leading in {}/{} criteria", led.len(), analysis.len()));
        } else {
            reasons.push(format!("Excels in: {}", names_of(led.into_iter().take(2))));
        }
    }

    if winner.key_strengths.len() >= 3 {
        reasons.push("Multiple key strengths identified".to_string());
    }
    match winner.key_weaknesses.len() {
        0 => reasons.push("No significant weaknesses detected".to_string()),
        1 => reasons.push("Minimal weaknesses".to_string()),
        _ => {}
    }

    format!("Recommended because: {}", reasons.join("; "))
}

/// Full comparison of a batch. `None` for an empty batch.
pub fn analyze(results: &[CandidateEvaluation], strategy: RankingStrategy) -> Option<ComparisonSummary> {
    let rankings = rank(results, strategy);
    let best_candidate = rankings.first()?.clone();

    let stats = statistical_summary(results);
    let analysis = criteria_analysis(results);
    let insights = cross_candidate_insights(results, &analysis, &stats);
    let rationale = recommendation_rationale(&best_candidate, &analysis);
    tracing::debug!(
        candidates = results.len(),
        strategy = strategy.as_str(),
        best = %best_candidate.candidate_id,
        "batch analyzed"
    );

    Some(ComparisonSummary {
        best_candidate,
        rankings,
        statistical_summary: stats,
        criteria_analysis: analysis,
        cross_candidate_insights: insights,
        recommendation_rationale: rationale,
        ranking_strategy: strategy,
        analysis_method: "deterministic".to_string(),
    })
}
