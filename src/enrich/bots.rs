use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::{info, warn};

/// Two-tier bot signature sets.
///
/// Tier one is a curated list of literal substrings (programmatic clients,
/// monitoring tools, automation frameworks) matched case-insensitively.
/// Tier two is a larger corpus of regex patterns covering traditional
/// crawlers. The literal tier is checked first because substring scans are
/// much cheaper than the regex corpus; a hit in either tier yields the same
/// classification.
pub struct BotSignatures {
    literals: Vec<String>,
    patterns: Vec<Regex>,
}

#[derive(Deserialize)]
struct CustomBotsFile {
    bot_signatures: Vec<String>,
}

#[derive(Deserialize)]
struct PatternEntry {
    regex: Option<String>,
}

impl BotSignatures {
    /// Load both signature sets from a resources directory. A missing or
    /// unreadable file degrades to the built-in fallback with a warning
    /// rather than failing startup.
    pub fn load(resource_dir: &Path) -> Self {
        let literals = match load_custom_signatures(&resource_dir.join("custom_bots.yml")) {
            Ok(sigs) => {
                info!(count = sigs.len(), "loaded custom bot signatures");
                sigs
            }
            Err(e) => {
                warn!(error = %e, "custom bot signatures unavailable; using fallback");
                fallback_literals()
            }
        };
        let patterns = match load_pattern_corpus(&resource_dir.join("matomo/bots.yml")) {
            Ok(pats) => {
                info!(count = pats.len(), "loaded bot pattern corpus");
                pats
            }
            Err(e) => {
                warn!(error = %e, "bot pattern corpus unavailable; using fallback");
                fallback_patterns()
            }
        };
        Self { literals, patterns }
    }

    /// Build from in-memory sets. Literals are lowercased here so matching
    /// can assume a lowercase needle.
    pub fn from_parts(literals: Vec<String>, patterns: Vec<Regex>) -> Self {
        Self {
            literals: literals.into_iter().map(|s| s.to_lowercase()).collect(),
            patterns,
        }
    }

    /// Whether the user agent belongs to automated traffic. Empty input is
    /// not a bot.
    pub fn is_bot(&self, user_agent: &str) -> bool {
        if user_agent.is_empty() {
            return false;
        }
        let ua_lower = user_agent.to_lowercase();
        if self.literals.iter().any(|sig| ua_lower.contains(sig)) {
            return true;
        }
        self.patterns.iter().any(|p| p.is_match(user_agent))
    }
}

fn load_custom_signatures(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: CustomBotsFile = serde_yaml::from_str(&raw)?;
    Ok(parsed
        .bot_signatures
        .into_iter()
        .map(|s| s.to_lowercase())
        .collect())
}

fn load_pattern_corpus(path: &Path) -> anyhow::Result<Vec<Regex>> {
    let raw = std::fs::read_to_string(path)?;
    let entries: Vec<PatternEntry> = serde_yaml::from_str(&raw)?;
    let mut patterns = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(pat) = entry.regex else { continue };
        match RegexBuilder::new(&pat).case_insensitive(true).build() {
            Ok(re) => patterns.push(re),
            // A handful of upstream patterns use syntax our engine rejects;
            // the literal tier and remaining patterns still cover them.
            Err(e) => warn!(pattern = %pat, error = %e, "skipping invalid bot pattern"),
        }
    }
    Ok(patterns)
}

fn fallback_literals() -> Vec<String> {
    vec!["bot".to_string()]
}

fn fallback_patterns() -> Vec<Regex> {
    vec![RegexBuilder::new("bot")
        .case_insensitive(true)
        .build()
        .expect("fallback pattern is valid")]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigs() -> BotSignatures {
        BotSignatures::from_parts(
            vec!["curl".into(), "Python-Requests".into()],
            vec![RegexBuilder::new(r"Googlebot|bingbot")
                .case_insensitive(true)
                .build()
                .unwrap()],
        )
    }

    #[test]
    fn literal_tier_matches_case_insensitively() {
        let s = sigs();
        assert!(s.is_bot("curl/8.4.0"));
        assert!(s.is_bot("python-requests/2.31.0"));
        assert!(s.is_bot("PYTHON-REQUESTS/2.31.0"));
    }

    #[test]
    fn pattern_tier_catches_crawlers_on_literal_miss() {
        let s = sigs();
        assert!(s.is_bot(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
        ));
        assert!(s.is_bot("Mozilla/5.0 (compatible; BingBot/2.0)"));
    }

    #[test]
    fn humans_and_empty_input_pass_through() {
        let s = sigs();
        assert!(!s.is_bot(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        ));
        assert!(!s.is_bot(""));
    }

    #[test]
    fn missing_resources_fall_back_to_basic_signature() {
        let s = BotSignatures::load(Path::new("/nonexistent"));
        assert!(s.is_bot("Mozilla/5.0 (compatible; SomeBot/1.0)"));
        assert!(!s.is_bot("Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0"));
    }

    #[test]
    fn parses_yaml_resource_shapes() {
        let custom: CustomBotsFile =
            serde_yaml::from_str("bot_signatures:\n  - curl\n  - wget\n").unwrap();
        assert_eq!(custom.bot_signatures, vec!["curl", "wget"]);

        let entries: Vec<PatternEntry> =
            serde_yaml::from_str("- name: G\n  regex: Googlebot\n- name: X\n").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].regex.as_deref(), Some("Googlebot"));
        assert!(entries[1].regex.is_none());
    }
}
