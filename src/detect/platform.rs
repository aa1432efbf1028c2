use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
    Twitter,
    Facebook,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Unknown => "unknown",
        }
    }

    /// Prefix put in front of output filenames so the client can tell sources apart.
    pub fn file_prefix(&self) -> Option<&'static str> {
        match self {
            Platform::Youtube => Some("YT"),
            Platform::Instagram => Some("IG"),
            Platform::Tiktok => Some("TT"),
            Platform::Twitter => Some("TW"),
            Platform::Facebook => Some("FB"),
            Platform::Unknown => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const DOMAINS: &[(Platform, &[&str])] = &[
    (
        Platform::Youtube,
        &["youtube.com", "youtu.be", "youtube-nocookie.com"],
    ),
    (Platform::Instagram, &["instagram.com", "instagr.am"]),
    (Platform::Tiktok, &["tiktok.com"]),
    (Platform::Twitter, &["twitter.com", "x.com"]),
    (Platform::Facebook, &["facebook.com", "fb.watch"]),
];

/// Classify a user-supplied URL by host. Scheme-less input ("youtu.be/abc") is accepted.
pub fn detect_platform(input: &str) -> Platform {
    parse_source_url(input)
        .map(|(platform, _)| platform)
        .unwrap_or(Platform::Unknown)
}

/// Classify and normalize a supported URL. The returned `Url` always carries an
/// http(s) scheme, so it is safe to hand to the engine as a positional argument.
/// Input that looks like a command-line option is never a source.
pub fn parse_source_url(input: &str) -> Option<(Platform, Url)> {
    let input = input.trim();
    if input.is_empty() || input.starts_with('-') {
        return None;
    }

    let parsed = Url::parse(input)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{}", input)).ok())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str()?.to_ascii_lowercase();
    if host.starts_with('-') {
        return None;
    }

    DOMAINS
        .iter()
        .find(|(_, domains)| domains.iter().any(|d| is_domain_match(&host, d)))
        .map(|(platform, _)| (*platform, parsed))
}

fn is_domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_match_requires_label_boundary() {
        assert!(is_domain_match("vm.tiktok.com", "tiktok.com"));
        assert!(is_domain_match("x.com", "x.com"));
        assert!(!is_domain_match("netflix.com", "x.com"));
        assert!(!is_domain_match("notyoutube.com", "youtube.com"));
    }

    #[test]
    fn test_source_url_normalized() {
        let (platform, url) = parse_source_url("youtu.be/abc?t=5").unwrap();
        assert_eq!(platform, Platform::Youtube);
        assert_eq!(url.as_str(), "https://youtu.be/abc?t=5");
    }

    #[test]
    fn test_option_like_input_rejected() {
        for input in ["--exec=x.youtube.com", "-ox.youtube.com", " --batch-file=a.youtube.com"] {
            assert!(parse_source_url(input).is_none(), "{}", input);
            assert_eq!(detect_platform(input), Platform::Unknown);
        }
    }
}
