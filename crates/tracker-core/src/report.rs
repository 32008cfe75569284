//! Side-by-side comparison of every tracked URL
//!
//! One row per (tracker, strategy). Percentile ranks are computed across all
//! rows that have samples, so a mobile row is ranked against desktop rows too.

use crate::models::{MetricKey, Strategy};
use crate::scoring::{Contribution, ScoringModel};
use crate::stats::percentile_rank;
use crate::tracker::{Registry, SortColumn, SortDirection, SortState};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricColumn {
    pub mean_value: f64,
    pub mean_score: f64,
    /// Rank of `mean_score` among all rows
    pub percentile: f64,
    /// Log-normal contribution of `mean_value`
    pub contribution: Option<Contribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub url: String,
    pub label: Option<String>,
    pub strategy: Strategy,
    pub samples: usize,
    pub mean_score: Option<f64>,
    pub ci95_half_width: Option<f64>,
    pub score_percentile: Option<f64>,
    /// Mean score minus the baseline tracker's mean for the same strategy
    pub baseline_delta: Option<f64>,
    pub is_baseline: bool,
    pub metrics: BTreeMap<MetricKey, MetricColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub baseline: Option<String>,
    pub sort: SortState,
    pub rows: Vec<ComparisonRow>,
}

pub fn build_report(registry: &Registry, model: &ScoringModel) -> ComparisonReport {
    let baseline = registry.baseline().map(str::to_string);

    let mut rows: Vec<ComparisonRow> = Vec::new();
    for tracker in registry.iter() {
        for strategy in Strategy::ALL {
            let summary = tracker.history().get(strategy).summary();
            let metrics = summary
                .as_ref()
                .map(|summary| {
                    summary
                        .metrics
                        .iter()
                        .map(|(key, metric)| {
                            (
                                *key,
                                MetricColumn {
                                    mean_value: metric.mean_value,
                                    mean_score: metric.mean_score,
                                    percentile: 0.0,
                                    contribution: model.contribution(
                                        strategy,
                                        *key,
                                        metric.mean_value,
                                    ),
                                },
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();

            rows.push(ComparisonRow {
                url: tracker.url().to_string(),
                label: tracker.label().map(str::to_string),
                strategy,
                samples: summary.as_ref().map_or(0, |s| s.samples),
                mean_score: summary.as_ref().map(|s| s.mean_score),
                ci95_half_width: summary.as_ref().and_then(|s| s.ci95_half_width),
                score_percentile: None,
                baseline_delta: None,
                is_baseline: baseline.as_deref() == Some(tracker.url()),
                metrics,
            });
        }
    }

    rank_rows(&mut rows);
    apply_baseline(&mut rows);
    sort_rows(&mut rows, registry.sort());

    ComparisonReport {
        baseline,
        sort: registry.sort(),
        rows,
    }
}

fn rank_rows(rows: &mut [ComparisonRow]) {
    let scores: Vec<f64> = rows.iter().filter_map(|r| r.mean_score).collect();
    let metric_scores: BTreeMap<MetricKey, Vec<f64>> = MetricKey::ALL
        .into_iter()
        .map(|key| {
            let population = rows
                .iter()
                .filter_map(|r| r.metrics.get(&key).map(|m| m.mean_score))
                .collect();
            (key, population)
        })
        .collect();

    for row in rows.iter_mut() {
        row.score_percentile = row.mean_score.map(|score| percentile_rank(&scores, score));
        for (key, column) in row.metrics.iter_mut() {
            if let Some(population) = metric_scores.get(key) {
                column.percentile = percentile_rank(population, column.mean_score);
            }
        }
    }
}

fn apply_baseline(rows: &mut [ComparisonRow]) {
    let baseline_scores: Vec<(Strategy, f64)> = rows
        .iter()
        .filter(|r| r.is_baseline)
        .filter_map(|r| r.mean_score.map(|score| (r.strategy, score)))
        .collect();

    for row in rows.iter_mut() {
        let baseline = baseline_scores
            .iter()
            .find(|(strategy, _)| *strategy == row.strategy)
            .map(|(_, score)| *score);
        row.baseline_delta = match (row.mean_score, baseline) {
            (Some(score), Some(baseline)) => Some(score - baseline),
            _ => None,
        };
    }
}

/// Order rows by the selected column; rows without data sort last either way
pub fn sort_rows(rows: &mut [ComparisonRow], sort: SortState) {
    let directed = |ordering: Ordering| match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    };
    let by_option = |a: Option<f64>, b: Option<f64>| match (a, b) {
        (Some(a), Some(b)) => directed(a.total_cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    match sort.column {
        // Rows are built in display order and the sort is stable
        SortColumn::Order => {
            if sort.direction == SortDirection::Desc {
                rows.reverse();
            }
        }
        SortColumn::Url => rows.sort_by(|a, b| directed(a.url.cmp(&b.url))),
        SortColumn::Score => rows.sort_by(|a, b| by_option(a.mean_score, b.mean_score)),
        SortColumn::Confidence => {
            rows.sort_by(|a, b| by_option(a.ci95_half_width, b.ci95_half_width))
        }
        SortColumn::Samples => rows.sort_by(|a, b| directed(a.samples.cmp(&b.samples))),
        SortColumn::Metric(key) => rows.sort_by(|a, b| {
            by_option(
                a.metrics.get(&key).map(|m| m.mean_value),
                b.metrics.get(&key).map(|m| m.mean_value),
            )
        }),
    }
}
