use woothee::parser::Parser;

use super::bots::BotSignatures;

/// Device classes produced by the keyword heuristics.
pub const DEVICE_MOBILE: &str = "Mobile";
pub const DEVICE_TABLET: &str = "Tablet";
pub const DEVICE_DESKTOP: &str = "Desktop";

/// Normalized view of one user-agent string.
///
/// Bot traffic carries no browser/OS/device: those fields are self-reported
/// and bots routinely lie in them, so the flag alone is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UaProfile {
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub is_bot: bool,
}

pub struct UserAgentProvider {
    signatures: BotSignatures,
    parser: Parser,
}

impl UserAgentProvider {
    pub fn new(signatures: BotSignatures) -> Self {
        Self {
            signatures,
            parser: Parser::new(),
        }
    }

    /// Classify a raw user-agent string.
    ///
    /// Bot detection runs before any parsing so bot traffic short-circuits
    /// to the all-null profile. Empty input yields the all-null, non-bot
    /// profile.
    pub fn classify(&self, user_agent: &str) -> UaProfile {
        if user_agent.is_empty() {
            return UaProfile::default();
        }
        if self.signatures.is_bot(user_agent) {
            return UaProfile {
                is_bot: true,
                ..UaProfile::default()
            };
        }

        let (browser, os) = match self.parser.parse(user_agent) {
            Some(parsed) => (
                known_family(parsed.name).map(|b| canonical_browser(b).to_string()),
                known_family(parsed.os).map(str::to_string),
            ),
            None => (None, None),
        };

        UaProfile {
            browser,
            os,
            device: Some(device_class(user_agent).to_string()),
            is_bot: false,
        }
    }
}

/// Treat the parser's "unknown" sentinel as no value.
fn known_family(family: &str) -> Option<&str> {
    if family.is_empty() || family == "UNKNOWN" || family == "Other" {
        None
    } else {
        Some(family)
    }
}

/// Collapse mobile/variant forms of a browser family into one canonical name.
pub fn canonical_browser(family: &str) -> &str {
    match family {
        "Chrome Mobile" | "Chrome Mobile iOS" | "Chrome Mobile WebView" | "Google"
        | "Chromium" => "Chrome",
        "Mobile Safari" | "Safari Mobile" | "Mobile Safari UI/WKWebView" => "Safari",
        "Opera Mini" | "Opera Mobile" => "Opera",
        other => other,
    }
}

/// Mobile/Tablet/Desktop via keyword heuristics over the lowercased string.
/// Mobile keywords win ties: iPad user agents that also say "Mobile"
/// classify as Mobile.
pub fn device_class(user_agent: &str) -> &'static str {
    let ua_lower = user_agent.to_lowercase();
    if ua_lower.contains("mobile") || ua_lower.contains("phone") {
        DEVICE_MOBILE
    } else if ua_lower.contains("tablet") || ua_lower.contains("ipad") {
        DEVICE_TABLET
    } else {
        DEVICE_DESKTOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
         AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const SAFARI_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";
    const FIREFOX_ANDROID_TABLET: &str =
        "Mozilla/5.0 (Android 13; Tablet; rv:109.0) Gecko/119.0 Firefox/119.0";

    fn provider() -> UserAgentProvider {
        UserAgentProvider::new(BotSignatures::from_parts(
            vec!["curl".into(), "python-requests".into()],
            vec![RegexBuilder::new("Googlebot")
                .case_insensitive(true)
                .build()
                .unwrap()],
        ))
    }

    #[test]
    fn bots_short_circuit_to_all_null() {
        let p = provider();
        for ua in [
            "curl/8.4.0",
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
        ] {
            let profile = p.classify(ua);
            assert_eq!(
                profile,
                UaProfile {
                    browser: None,
                    os: None,
                    device: None,
                    is_bot: true,
                },
                "ua: {ua}"
            );
        }
    }

    #[test]
    fn desktop_browser_is_fully_classified() {
        let profile = provider().classify(CHROME_DESKTOP);
        assert_eq!(profile.browser.as_deref(), Some("Chrome"));
        assert_eq!(profile.device.as_deref(), Some(DEVICE_DESKTOP));
        assert!(profile.os.is_some());
        assert!(!profile.is_bot);
    }

    #[test]
    fn phones_and_tablets_get_their_device_class() {
        let p = provider();
        assert_eq!(
            p.classify(SAFARI_IPHONE).device.as_deref(),
            Some(DEVICE_MOBILE)
        );
        assert_eq!(
            p.classify(FIREFOX_ANDROID_TABLET).device.as_deref(),
            Some(DEVICE_TABLET)
        );
    }

    #[test]
    fn mobile_keyword_wins_over_tablet_keywords() {
        // iPad user agents carry a "Mobile/<build>" token.
        assert_eq!(device_class(SAFARI_IPAD), DEVICE_MOBILE);
    }

    #[test]
    fn empty_input_is_all_null_non_bot() {
        assert_eq!(provider().classify(""), UaProfile::default());
    }

    #[test]
    fn browser_aliases_collapse() {
        assert_eq!(canonical_browser("Chrome Mobile iOS"), "Chrome");
        assert_eq!(canonical_browser("Chromium"), "Chrome");
        assert_eq!(canonical_browser("Mobile Safari"), "Safari");
        assert_eq!(canonical_browser("Opera Mini"), "Opera");
        assert_eq!(canonical_browser("Firefox"), "Firefox");
    }
}
