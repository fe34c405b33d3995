use crate::stats::BenchmarkStats;
use crate::types::{Source, TimestampMs};
use chrono::{DateTime, SecondsFormat};
use std::fmt;

const HEADER: &str = "===== BENCHMARK STATISTICS =====";
const FOOTER: &str = "================================";

fn upper(source: Option<Source>) -> String {
    source.map(|s| s.as_str().to_uppercase()).unwrap_or_default()
}

fn iso(timestamp: TimestampMs) -> String {
    DateTime::from_timestamp_millis(timestamp)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp.to_string())
}

impl fmt::Display for BenchmarkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", HEADER)?;
        writeln!(f, "Total tokens analyzed: {}", self.total_tokens)?;
        writeln!(
            f,
            "Total tokens per source: gRPC: {}, WSS: {}",
            self.tokens_per_source.grpc, self.tokens_per_source.wss
        )?;
        writeln!(f)?;

        if self.complete_pairs == 0 {
            writeln!(f, "Not enough complete pairs to calculate time statistics.")?;
            return writeln!(f, "{}", FOOTER);
        }

        writeln!(f, "Complete pairs: {}", self.complete_pairs)?;
        writeln!(f, "Incomplete pairs: {}", self.incomplete_pairs)?;
        writeln!(f)?;

        writeln!(
            f,
            "Fastest source: {} ({} times, {:.2}%)",
            upper(self.fastest_source.source),
            self.fastest_source.count,
            self.fastest_source.percentage
        )?;
        writeln!(
            f,
            "Average time faster: {} is faster by {:.2} ms",
            upper(self.average_time_faster.source),
            self.average_time_faster.milliseconds
        )?;
        writeln!(f)?;

        writeln!(f, "Average time difference: {:.2} ms", self.average_time_difference)?;
        writeln!(f, "Maximum time difference: {:.2} ms", self.max_time_difference as f64)?;
        writeln!(f, "Minimum time difference: {:.2} ms", self.min_time_difference as f64)?;
        writeln!(f)?;

        let seconds = self.duration.total_ms as f64 / 1000.0;
        let minutes = seconds / 60.0;
        writeln!(
            f,
            "Total benchmark duration: {} ms ({:.2} seconds)",
            self.duration.total_ms, seconds
        )?;
        if minutes >= 1.0 {
            writeln!(f, "                        {:.2} minutes", minutes)?;
        }
        writeln!(f, "Start time: {}", iso(self.duration.start_timestamp))?;
        writeln!(f, "End time: {}", iso(self.duration.end_timestamp))?;
        writeln!(f, "{}", FOOTER)
    }
}

#[cfg(test)]
mod tests {
    use crate::stats::analyze;
    use crate::types::{Observation, Source};

    fn entries(log: Vec<Observation>) -> Vec<Option<Observation>> {
        log.into_iter().map(Some).collect()
    }

    #[test]
    fn test_report_layout() {
        let log = vec![
            Observation::new("tokenA", 1_700_000_000_000, Source::Grpc),
            Observation::new("tokenA", 1_700_000_000_050, Source::Wss),
            Observation::new("tokenB", 1_700_000_090_000, Source::Grpc),
            Observation::new("tokenC", 1_700_000_100_000, Source::Wss),
        ];
        let report = analyze(&entries(log)).unwrap().to_string();

        assert!(report.contains("Total tokens analyzed: 2"));
        assert!(report.contains("Total tokens per source: gRPC: 2, WSS: 1"));
        assert!(report.contains("Complete pairs: 1\nIncomplete pairs: 1"));
        assert!(report.contains("Fastest source: GRPC (1 times, 100.00%)"));
        assert!(report.contains("Average time faster: GRPC is faster by 50.00 ms"));
        assert!(report.contains("Minimum time difference: 50.00 ms"));
        assert!(report.contains("Total benchmark duration: 90000 ms (90.00 seconds)"));
        assert!(report.contains("                        1.50 minutes"));
        assert!(report.contains("Start time: 2023-11-14T22:13:20.000Z"));
        assert!(report.contains("End time: 2023-11-14T22:14:50.000Z"));
    }

    #[test]
    fn test_report_without_pairs() {
        let log = vec![
            Observation::new("tokenA", 100, Source::Grpc),
            Observation::new("tokenB", 200, Source::Wss),
        ];
        let report = analyze(&entries(log)).unwrap().to_string();

        assert!(report.contains("Not enough complete pairs to calculate time statistics."));
        assert!(!report.contains("Fastest source"));
        assert!(report.trim_end().ends_with("================================"));
    }

    #[test]
    fn test_report_with_out_of_range_timestamps() {
        let log = vec![
            Observation::new("tokenA", i64::MIN, Source::Grpc),
            Observation::new("tokenA", i64::MAX, Source::Wss),
            Observation::new("tokenZ", 0, Source::Wss),
        ];
        let report = analyze(&entries(log)).unwrap().to_string();

        assert!(report.contains(&format!("Total benchmark duration: {} ms", u64::MAX)));
        assert!(report.contains(&format!("Start time: {}", i64::MIN)));
    }
}
