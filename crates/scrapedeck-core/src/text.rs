//! Pure text transforms for worker log output
//!
//! The worker logs through loguru with `colorize=True`, so stderr lines arrive
//! wrapped in ANSI color codes and prefixed with a timestamp/level/location
//! header:
//!
//! ```text
//! 2026-01-12 10:31:07 | INFO     | src.orchestrator:scrape_products - Scraping kelly
//! ```
//!
//! None of these functions hold state; the supervisor forwards raw lines and the
//! UI layer applies whichever transforms it wants for display.

use regex::Regex;
use std::sync::LazyLock;

use crate::events::LogOrigin;
use crate::types::LogLevel;

/// ANSI escape sequences (CSI, OSC and simple two-byte escapes)
static ANSI_ESCAPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \x1b\[[0-9;?]*[A-Za-z]               # CSI sequences
        | \x1b\][^\x07\x1b]*(?:\x07|\x1b\\)  # OSC sequences
        | \x1b[A-Za-z]                       # Simple escapes
        ",
    )
    .expect("ANSI regex pattern is valid")
});

/// loguru header: `<date> <time>[.ms] | <LEVEL> | <module>:<function>[:<line>] - `
static LOGURU_HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?\s+\|\s+(?P<level>[A-Z]+)\s*\|\s+[\w.<>-]+:[\w<>]+(?::\d+)?\s+-\s?(?P<message>.*)$",
    )
    .expect("loguru header regex pattern is valid")
});

/// Strip all ANSI escape sequences from a string.
///
/// # Examples
///
/// ```
/// use scrapedeck_core::text::strip_ansi_codes;
///
/// assert_eq!(strip_ansi_codes("\x1b[32mdone\x1b[0m"), "done");
/// ```
pub fn strip_ansi_codes(input: &str) -> String {
    ANSI_ESCAPE_PATTERN.replace_all(input, "").into_owned()
}

/// Check if a string contains ANSI escape sequences.
pub fn contains_ansi_codes(input: &str) -> bool {
    ANSI_ESCAPE_PATTERN.is_match(input)
}

/// Strip ANSI codes and the loguru header, leaving only the message.
///
/// Lines without a loguru header are returned with ANSI codes stripped and
/// surrounding whitespace trimmed.
pub fn prettify_log_line(raw: &str) -> String {
    let cleaned = strip_ansi_codes(raw);
    let trimmed = cleaned.trim();
    match LOGURU_HEADER_PATTERN.captures(trimmed) {
        Some(caps) => caps["message"].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Determine the severity of a raw worker line.
///
/// Uses the loguru level when a header is present. Otherwise stderr output is
/// treated as an error (tracebacks, interpreter failures) and stdout as info.
pub fn detect_level(raw: &str, origin: LogOrigin) -> LogLevel {
    let cleaned = strip_ansi_codes(raw);
    if let Some(caps) = LOGURU_HEADER_PATTERN.captures(cleaned.trim()) {
        return match &caps["level"] {
            "TRACE" | "DEBUG" => LogLevel::Debug,
            "INFO" | "SUCCESS" => LogLevel::Info,
            "WARNING" => LogLevel::Warning,
            "ERROR" | "CRITICAL" => LogLevel::Error,
            _ => LogLevel::Info,
        };
    }

    match origin {
        LogOrigin::Stderr => LogLevel::Error,
        LogOrigin::Stdout => LogLevel::Info,
    }
}

/// Collapse runs of identical consecutive lines into one.
///
/// Order is preserved; lines that repeat non-consecutively are kept.
pub fn dedupe_consecutive<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if out.last().map(String::as_str) != Some(line) {
            out.push(line.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_simple_color_codes() {
        let input = "\x1b[31mred text\x1b[0m";
        assert_eq!(strip_ansi_codes(input), "red text");
    }

    #[test]
    fn test_strip_multiple_codes() {
        let input = "\x1b[1m\x1b[38;5;12mBold blue\x1b[0m";
        assert_eq!(strip_ansi_codes(input), "Bold blue");
    }

    #[test]
    fn test_strip_osc_hyperlink() {
        let input = "\x1b]8;;https://example.com\x07link\x1b]8;;\x07";
        assert_eq!(strip_ansi_codes(input), "link");
    }

    #[test]
    fn test_contains_ansi_codes() {
        assert!(contains_ansi_codes("\x1b[31mred\x1b[0m"));
        assert!(!contains_ansi_codes("plain text"));
    }

    #[test]
    fn test_prettify_colored_loguru_line() {
        let raw = "\x1b[32m2026-01-12 10:31:07\x1b[0m | \x1b[1mINFO    \x1b[0m | \x1b[36msrc.orchestrator\x1b[0m:\x1b[36mscrape_products\x1b[0m - \x1b[1mScraping kelly\x1b[0m";
        assert_eq!(prettify_log_line(raw), "Scraping kelly");
    }

    #[test]
    fn test_prettify_line_number_variant() {
        let raw = "2026-01-12 10:31:07.123 | WARNING  | src.cli:main:88 - Falling back";
        assert_eq!(prettify_log_line(raw), "Falling back");
    }

    #[test]
    fn test_prettify_plain_line_untouched() {
        assert_eq!(prettify_log_line("  Processing kelly  "), "Processing kelly");
    }

    #[test]
    fn test_detect_level_from_loguru() {
        let raw = "2026-01-12 10:31:07 | ERROR    | src.cli:main - Scraping failed";
        assert_eq!(detect_level(raw, LogOrigin::Stderr), LogLevel::Error);

        let raw = "2026-01-12 10:31:07 | SUCCESS  | src.cli:main - Successfully scraped 2 products!";
        assert_eq!(detect_level(raw, LogOrigin::Stderr), LogLevel::Info);

        let raw = "2026-01-12 10:31:07 | DEBUG    | src.cli:main - details";
        assert_eq!(detect_level(raw, LogOrigin::Stderr), LogLevel::Debug);
    }

    #[test]
    fn test_detect_level_falls_back_to_origin() {
        assert_eq!(
            detect_level("Traceback (most recent call last):", LogOrigin::Stderr),
            LogLevel::Error
        );
        assert_eq!(
            detect_level("Processing kelly", LogOrigin::Stdout),
            LogLevel::Info
        );
    }

    #[test]
    fn test_dedupe_consecutive() {
        let lines = ["a", "a", "b", "a", "a", "a", "c"];
        assert_eq!(dedupe_consecutive(lines), vec!["a", "b", "a", "c"]);
    }

    #[test]
    fn test_dedupe_consecutive_empty() {
        let lines: Vec<String> = Vec::new();
        assert!(dedupe_consecutive(lines).is_empty());
    }
}
