//! Lexical and recency rescoring
//!
//! Vector similarity dominates; keyword overlap is a meaningful secondary
//! signal and recency only breaks near-ties.

use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Weight of the lexical overlap term
pub const LEXICAL_WEIGHT: f64 = 0.20;

/// Weight of the recency term
pub const RECENCY_WEIGHT: f64 = 0.05;

/// Messages older than this many days get no recency boost
pub const RECENCY_HORIZON_DAYS: i64 = 3650;

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"[a-z0-9#@._-]+").expect("static token regex"))
}

/// Distinct lowercase tokens: runs of letters, digits and `#@._-`
pub fn tokenize(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    token_re()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Fraction of query tokens present in `text`
pub fn lexical_overlap(query_terms: &HashSet<String>, text: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms = tokenize(text);
    if text_terms.is_empty() {
        return 0.0;
    }
    let overlap = query_terms.intersection(&text_terms).count();
    overlap as f64 / query_terms.len() as f64
}

/// Linear boost from 1.0 for today down to 0.0 at the horizon.
/// Unparseable dates get no boost.
pub fn recency_boost(date: &str, today: NaiveDate) -> f64 {
    let Ok(message_date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return 0.0;
    };
    let age_days = (today - message_date).num_days();
    let clamped = age_days.clamp(0, RECENCY_HORIZON_DAYS);
    1.0 - (clamped as f64 / RECENCY_HORIZON_DAYS as f64)
}

/// Final ranking value
pub fn combined_score(vector_score: f64, lexical: f64, recency: f64) -> f64 {
    vector_score + LEXICAL_WEIGHT * lexical + RECENCY_WEIGHT * recency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_tokenize_keeps_symbols_and_lowercases() {
        let tokens = tokenize("Deploy FAILED on web-1.prod, ping @alice in #ops!");
        for expected in ["deploy", "failed", "on", "web-1.prod", "ping", "@alice", "in", "#ops"] {
            assert!(tokens.contains(expected), "missing {expected}");
        }
        assert!(!tokens.iter().any(|t| t.contains(',') || t.contains('!')));
    }

    #[test]
    fn test_lexical_overlap_edges() {
        let query = tokenize("deploy failed");
        assert_eq!(lexical_overlap(&HashSet::new(), "deploy failed"), 0.0);
        assert_eq!(lexical_overlap(&query, ""), 0.0);
        assert_eq!(lexical_overlap(&query, "!!! ???"), 0.0);
        assert_eq!(lexical_overlap(&query, "the deploy FAILED again"), 1.0);
        assert_eq!(lexical_overlap(&query, "deploy succeeded"), 0.5);
    }

    #[test]
    fn test_recency_boost_bounds_and_linearity() {
        let today = date("2024-06-01");
        assert_eq!(recency_boost("2024-06-01", today), 1.0);
        assert_eq!(recency_boost("2014-06-03", today), 0.0);
        assert_eq!(recency_boost("1999-01-01", today), 0.0);

        let half = today - chrono::Duration::days(1825);
        let boost = recency_boost(&half.format("%Y-%m-%d").to_string(), today);
        assert!((boost - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_recency_boost_future_dates_clamp_to_one() {
        assert_eq!(recency_boost("2030-01-01", date("2024-06-01")), 1.0);
    }

    #[test]
    fn test_recency_boost_unparseable_is_zero() {
        let today = date("2024-06-01");
        assert_eq!(recency_boost("", today), 0.0);
        assert_eq!(recency_boost("yesterday", today), 0.0);
        assert_eq!(recency_boost("2024-13-01", today), 0.0);
    }

    #[test]
    fn test_combined_score_monotone_in_each_component() {
        let steps = [0.0, 0.25, 0.5, 0.75, 1.0];
        for &vector in &[0.1, 0.8] {
            for &fixed in &steps {
                let mut prev_lex = f64::MIN;
                let mut prev_rec = f64::MIN;
                for &x in &steps {
                    let by_lex = combined_score(vector, x, fixed);
                    let by_rec = combined_score(vector, fixed, x);
                    assert!(by_lex >= prev_lex);
                    assert!(by_rec >= prev_rec);
                    prev_lex = by_lex;
                    prev_rec = by_rec;
                }
            }
        }
    }

    #[test]
    fn test_combined_score_weights() {
        let score = combined_score(0.5, 1.0, 1.0);
        assert!((score - 0.75).abs() < 1e-12);
    }
}
