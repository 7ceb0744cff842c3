use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// 2 to 5 upper-case letters, optionally followed by `.` or `...` (OCR output
/// often truncates or punctuates the symbol column).
const TICKER_PATTERN: &str = r"^[A-Z]{2,5}(?:\.\.\.|\.)?$";

fn ticker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TICKER_PATTERN).expect("ticker pattern is a valid regex"))
}

pub fn is_ticker_token(token: &str) -> bool {
    ticker_regex().is_match(token)
}

/// First token of every line that looks like a ticker, with trailing dots
/// removed, de-duplicated in first-seen order.
pub fn extract_candidates(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in text.lines() {
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        if !is_ticker_token(first) {
            continue;
        }
        let ticker = first.trim_end_matches('.').to_string();
        if seen.insert(ticker.clone()) {
            out.push(ticker);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ticker_shapes() {
        for t in ["AA", "AAPL", "GOOGL", "MSFT.", "NVDA..."] {
            assert!(is_ticker_token(t), "{t} should match");
        }
    }

    #[test]
    fn rejects_non_ticker_shapes() {
        for t in [
            "A", "TOOLONG", "aapl", "Aapl", "1234", "AB1", "MSFT..", "MSFT....", "BRK.B", "", "$AAPL",
        ] {
            assert!(!is_ticker_token(t), "{t} should not match");
        }
    }

    #[test]
    fn extracts_first_token_per_line() {
        let text = "Holdings\nAAPL 10 185.00\n  MSFT. 5 410.10\nTotal value 1234\nNVDA... 2\n\nCASH\nAAPL 3\nfoo AAPL\n";
        assert_eq!(
            extract_candidates(text),
            vec!["AAPL", "MSFT", "NVDA", "CASH"]
        );
    }

    #[test]
    fn empty_text_has_no_candidates() {
        assert!(extract_candidates("").is_empty());
        assert!(extract_candidates("\n \n\t\n").is_empty());
    }
}
