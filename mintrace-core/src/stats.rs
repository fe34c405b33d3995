//! Offline pairing of observations and latency statistics.

use crate::types::{Observation, Source, TimestampMs};
use serde::Serialize;
use std::collections::HashMap;

/// Both sources' arrival times for one token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub grpc_timestamp: Option<TimestampMs>,
    pub wss_timestamp: Option<TimestampMs>,
}

impl TokenPair {
    fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            grpc_timestamp: None,
            wss_timestamp: None,
        }
    }

    fn set(&mut self, source: Source, timestamp: TimestampMs) {
        match source {
            Source::Grpc => self.grpc_timestamp = Some(timestamp),
            Source::Wss => self.wss_timestamp = Some(timestamp),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.grpc_timestamp.is_some() && self.wss_timestamp.is_some()
    }

    /// Absolute arrival delta, once both sources have reported
    pub fn time_difference(&self) -> Option<u64> {
        match (self.grpc_timestamp, self.wss_timestamp) {
            (Some(grpc), Some(wss)) => Some(wss.abs_diff(grpc)),
            _ => None,
        }
    }

    /// Equal timestamps count as a push-socket win
    pub fn faster_source(&self) -> Option<Source> {
        match (self.grpc_timestamp, self.wss_timestamp) {
            (Some(grpc), Some(wss)) if grpc < wss => Some(Source::Grpc),
            (Some(_), Some(_)) => Some(Source::Wss),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TokensPerSource {
    pub grpc: usize,
    pub wss: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AverageTimeFaster {
    pub source: Option<Source>,
    pub milliseconds: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FastestSource {
    pub source: Option<Source>,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkDuration {
    pub total_ms: u64,
    pub start_timestamp: TimestampMs,
    pub end_timestamp: TimestampMs,
}

/// Aggregate comparison of the two delivery paths
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkStats {
    pub total_tokens: usize,
    pub tokens_per_source: TokensPerSource,
    pub average_time_faster: AverageTimeFaster,
    pub average_time_difference: f64,
    pub max_time_difference: u64,
    pub min_time_difference: u64,
    pub fastest_source: FastestSource,
    pub complete_pairs: usize,
    pub incomplete_pairs: usize,
    pub duration: BenchmarkDuration,
}

/// Group observations by token, keeping first-seen order.
///
/// A later record for the same (token, source) overwrites the earlier one.
pub fn pair_observations(records: &[Observation]) -> Vec<TokenPair> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut pairs: Vec<TokenPair> = Vec::new();

    for record in records {
        let slot = *index.entry(record.token.as_str()).or_insert_with(|| {
            pairs.push(TokenPair::new(&record.token));
            pairs.len() - 1
        });
        pairs[slot].set(record.source, record.timestamp);
    }

    pairs
}

/// Compute statistics over every record given
pub fn compute_stats(records: &[Observation]) -> BenchmarkStats {
    let pairs = pair_observations(records);

    let mut stats = BenchmarkStats {
        total_tokens: pairs.len(),
        tokens_per_source: TokensPerSource {
            grpc: pairs.iter().filter(|p| p.grpc_timestamp.is_some()).count(),
            wss: pairs.iter().filter(|p| p.wss_timestamp.is_some()).count(),
        },
        ..Default::default()
    };

    let start = records.iter().map(|r| r.timestamp).min();
    let end = records.iter().map(|r| r.timestamp).max();
    if let (Some(start), Some(end)) = (start, end) {
        stats.duration = BenchmarkDuration {
            total_ms: end.abs_diff(start),
            start_timestamp: start,
            end_timestamp: end,
        };
    }

    let complete: Vec<(u64, Source)> = pairs
        .iter()
        .filter_map(|p| Some((p.time_difference()?, p.faster_source()?)))
        .collect();

    stats.complete_pairs = complete.len();
    stats.incomplete_pairs = pairs.len() - complete.len();

    if complete.is_empty() {
        return stats;
    }

    let diffs: Vec<u64> = complete.iter().map(|(diff, _)| *diff).collect();
    stats.average_time_difference = mean(&diffs);
    stats.max_time_difference = diffs.iter().copied().max().unwrap_or_default();
    stats.min_time_difference = diffs.iter().copied().min().unwrap_or_default();

    let wins_for = |source: Source| -> Vec<u64> {
        complete
            .iter()
            .filter(|(_, faster)| *faster == source)
            .map(|(diff, _)| *diff)
            .collect()
    };
    let grpc_wins = wins_for(Source::Grpc);
    let wss_wins = wins_for(Source::Wss);

    let (leader, leader_count) = if grpc_wins.len() >= wss_wins.len() {
        (Source::Grpc, grpc_wins.len())
    } else {
        (Source::Wss, wss_wins.len())
    };
    stats.fastest_source = FastestSource {
        source: Some(leader),
        count: leader_count,
        percentage: leader_count as f64 / complete.len() as f64 * 100.0,
    };

    if !grpc_wins.is_empty() && grpc_wins.len() >= wss_wins.len() {
        stats.average_time_faster = AverageTimeFaster {
            source: Some(Source::Grpc),
            milliseconds: mean(&grpc_wins),
        };
    } else if !wss_wins.is_empty() {
        stats.average_time_faster = AverageTimeFaster {
            source: Some(Source::Wss),
            milliseconds: mean(&wss_wins),
        };
    }

    stats
}

/// Analyse a full log, given as raw entries in append order with `None` for
/// entries that did not parse.
///
/// Returns `None` when the log is empty. The final raw entry is excluded,
/// well-formed or not, since it is most likely a write still in flight.
pub fn analyze(entries: &[Option<Observation>]) -> Option<BenchmarkStats> {
    let (_, settled) = entries.split_last()?;
    let records: Vec<Observation> = settled.iter().flatten().cloned().collect();
    Some(compute_stats(&records))
}

fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| u128::from(v)).sum::<u128>() as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(token: &str, timestamp: i64, source: Source) -> Option<Observation> {
        Some(Observation::new(token, timestamp, source))
    }

    #[test]
    fn test_example_scenario() {
        let log = vec![
            obs("tokenA", 100, Source::Grpc),
            obs("tokenA", 150, Source::Wss),
            obs("tokenB", 200, Source::Grpc),
            obs("tokenC", 999, Source::Wss),
        ];

        let stats = analyze(&log).unwrap();
        assert_eq!(stats.total_tokens, 2);
        assert_eq!(stats.tokens_per_source, TokensPerSource { grpc: 2, wss: 1 });
        assert_eq!(stats.complete_pairs, 1);
        assert_eq!(stats.incomplete_pairs, 1);
        assert_eq!(stats.average_time_difference, 50.0);
        assert_eq!(stats.max_time_difference, 50);
        assert_eq!(stats.min_time_difference, 50);
        assert_eq!(stats.fastest_source.source, Some(Source::Grpc));
        assert_eq!(stats.fastest_source.count, 1);
        assert_eq!(stats.fastest_source.percentage, 100.0);
        assert_eq!(stats.average_time_faster.source, Some(Source::Grpc));
        assert_eq!(stats.average_time_faster.milliseconds, 50.0);
        assert_eq!(
            stats.duration,
            BenchmarkDuration {
                total_ms: 100,
                start_timestamp: 100,
                end_timestamp: 200
            }
        );
    }

    #[test]
    fn test_tie_favours_grpc() {
        let mut log = Vec::new();
        for i in 0..3 {
            let base = i * 1000;
            log.push(obs(&format!("g{}", i), base, Source::Grpc));
            log.push(obs(&format!("g{}", i), base + 10, Source::Wss));
            log.push(obs(&format!("w{}", i), base + 30, Source::Grpc));
            log.push(obs(&format!("w{}", i), base, Source::Wss));
        }
        log.push(obs("trailing", 5000, Source::Grpc));

        let stats = analyze(&log).unwrap();
        assert_eq!(stats.complete_pairs, 6);
        assert_eq!(stats.fastest_source.source, Some(Source::Grpc));
        assert_eq!(stats.fastest_source.count, 3);
        assert_eq!(stats.fastest_source.percentage, 50.0);
        assert_eq!(stats.average_time_faster.source, Some(Source::Grpc));
        assert_eq!(stats.average_time_faster.milliseconds, 10.0);
        assert_eq!(stats.average_time_difference, 20.0);
    }

    #[test]
    fn test_wss_majority() {
        let log = vec![
            obs("a", 100, Source::Wss),
            obs("a", 140, Source::Grpc),
            obs("b", 200, Source::Wss),
            obs("b", 260, Source::Grpc),
            obs("c", 300, Source::Grpc),
            obs("c", 310, Source::Wss),
            obs("trailing", 400, Source::Wss),
        ];

        let stats = analyze(&log).unwrap();
        assert_eq!(stats.fastest_source.source, Some(Source::Wss));
        assert_eq!(stats.fastest_source.count, 2);
        assert_eq!(stats.average_time_faster.source, Some(Source::Wss));
        assert_eq!(stats.average_time_faster.milliseconds, 50.0);
        assert_eq!(stats.min_time_difference, 10);
        assert_eq!(stats.max_time_difference, 60);
    }

    #[test]
    fn test_equal_timestamps_count_for_wss() {
        let log = vec![
            Observation::new("a", 100, Source::Grpc),
            Observation::new("a", 100, Source::Wss),
        ];
        let pairs = pair_observations(&log);
        assert_eq!(pairs[0].time_difference(), Some(0));
        assert_eq!(pairs[0].faster_source(), Some(Source::Wss));
    }

    #[test]
    fn test_later_record_overwrites_same_source() {
        let log = vec![
            Observation::new("a", 100, Source::Grpc),
            Observation::new("a", 300, Source::Grpc),
            Observation::new("b", 50, Source::Wss),
        ];
        let pairs = pair_observations(&log);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].token, "a");
        assert_eq!(pairs[0].grpc_timestamp, Some(300));
        assert!(!pairs[0].is_complete());
        assert_eq!(pairs[1].token, "b");
    }

    #[test]
    fn test_excludes_exactly_last_record() {
        let log = vec![obs("a", 100, Source::Grpc), obs("a", 120, Source::Wss)];
        let stats = analyze(&log).unwrap();
        assert_eq!(stats, compute_stats(&[Observation::new("a", 100, Source::Grpc)]));
        assert_eq!(stats.complete_pairs, 0);
        assert_eq!(stats.total_tokens, 1);
    }

    #[test]
    fn test_malformed_last_entry_is_the_one_excluded() {
        let log = vec![
            obs("tokenA", 100, Source::Grpc),
            obs("tokenA", 150, Source::Wss),
            obs("tokenB", 200, Source::Grpc),
            None,
        ];

        let stats = analyze(&log).unwrap();
        assert_eq!(stats.total_tokens, 2);
        assert_eq!(stats.complete_pairs, 1);
        assert_eq!(stats.incomplete_pairs, 1);
    }

    #[test]
    fn test_malformed_entries_inside_the_log_are_skipped() {
        let log = vec![
            obs("a", 100, Source::Grpc),
            None,
            obs("a", 130, Source::Wss),
            obs("trailing", 200, Source::Grpc),
        ];

        let stats = analyze(&log).unwrap();
        assert_eq!(stats.complete_pairs, 1);
        assert_eq!(stats.max_time_difference, 30);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let log = vec![
            obs("a", i64::MIN, Source::Grpc),
            obs("a", i64::MAX, Source::Wss),
            obs("b", i64::MAX, Source::Grpc),
            obs("b", i64::MIN, Source::Wss),
            obs("z", 0, Source::Wss),
        ];

        let stats = analyze(&log).unwrap();
        assert_eq!(stats.complete_pairs, 2);
        assert_eq!(stats.max_time_difference, u64::MAX);
        assert_eq!(stats.min_time_difference, u64::MAX);
        assert_eq!(stats.average_time_difference, u64::MAX as f64);
        assert_eq!(stats.duration.total_ms, u64::MAX);
        assert_eq!(stats.duration.start_timestamp, i64::MIN);
        assert_eq!(stats.duration.end_timestamp, i64::MAX);
    }

    #[test]
    fn test_empty_log_has_no_stats() {
        assert!(analyze(&[]).is_none());
    }

    #[test]
    fn test_single_record_log_is_zeroed() {
        let stats = analyze(&[obs("a", 100, Source::Grpc)]).unwrap();
        assert_eq!(stats, BenchmarkStats::default());
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let log = vec![
            obs("a", 100, Source::Grpc),
            obs("a", 180, Source::Wss),
            obs("b", 220, Source::Wss),
            obs("b", 250, Source::Grpc),
            obs("c", 300, Source::Grpc),
        ];
        assert_eq!(analyze(&log), analyze(&log));
    }

    #[test]
    fn test_serializes_camel_case() {
        let log = vec![
            obs("a", 100, Source::Grpc),
            obs("a", 150, Source::Wss),
            obs("x", 1, Source::Grpc),
        ];
        let json = serde_json::to_value(analyze(&log).unwrap()).unwrap();
        assert_eq!(json["totalTokens"], 1);
        assert_eq!(json["tokensPerSource"]["grpc"], 1);
        assert_eq!(json["fastestSource"]["source"], "grpc");
        assert_eq!(json["averageTimeFaster"]["milliseconds"], 50.0);
        assert_eq!(json["duration"]["totalMs"], 50);
    }
}
