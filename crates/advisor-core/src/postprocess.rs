//! Response cleanup, short-mode summaries and threat classification.

use std::sync::OnceLock;

use regex::Regex;

use crate::state::Verbosity;

/// Maximum number of sentences kept in [`Verbosity::Short`].
pub const SUMMARY_SENTENCES: usize = 2;

/// Security terms and their canonical one-sentence explanations.
pub const GLOSSARY: &[(&str, &str)] = &[
    (
        "phishing",
        "Phishing is when criminals pretend to be someone you trust to trick you into giving away personal information.",
    ),
    (
        "malware",
        "Malware is any software designed to harm your device or steal your data.",
    ),
    (
        "ransomware",
        "Ransomware is software that locks your files and demands payment to unlock them.",
    ),
    (
        "two-factor authentication",
        "Two-factor authentication adds a second check, like a code on your phone, on top of your password.",
    ),
    (
        "password",
        "A strong password is long, unique for every account, and hard for others to guess.",
    ),
    (
        "encryption",
        "Encryption scrambles your data so only someone with the right key can read it.",
    ),
    (
        "threat",
        "A threat is anything that could damage your devices, accounts, or personal information.",
    ),
];

/// Words whose presence turns a screen scan into an alert.
pub const THREAT_KEYWORDS: &[&str] = &[
    "threat",
    "suspicious",
    "malicious",
    "phishing",
    "scam",
    "unsafe",
    "risk",
    "malware",
    "dangerous",
    "warning",
    "vulnerability",
    "hack",
];

pub const ALERT_PREFIX: &str = "⚠️ SECURITY ALERT: ";
pub const CLEAR_PREFIX: &str = "✅ SCREEN SCAN: ";

fn strip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            "[*_`",
            r"\x{1F300}-\x{1F5FF}",
            r"\x{1F600}-\x{1F64F}",
            r"\x{1F680}-\x{1F6FF}",
            r"\x{1F700}-\x{1F77F}",
            r"\x{1F780}-\x{1F7FF}",
            r"\x{1F800}-\x{1F8FF}",
            r"\x{1F900}-\x{1F9FF}",
            r"\x{1FA00}-\x{1FA6F}",
            r"\x{1FA70}-\x{1FAFF}",
            r"\x{2600}-\x{26FF}",
            r"\x{2700}-\x{27BF}",
            r"\x{1F1E6}-\x{1F1FF}",
            r"\x{FE0F}\x{200D}",
            "]",
        ))
        .expect("strip pattern is a valid character class")
    })
}

fn sentence_end() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[.!?]\s+").expect("sentence pattern is valid"))
}

/// Remove emphasis markers (`*`, `_`, `` ` ``) and emoji.
///
/// Only deletes characters, so applying it twice changes nothing.
pub fn strip_markdown(text: &str) -> String {
    strip_pattern().replace_all(text, "").into_owned()
}

/// Sentences split on `.`, `!` or `?` followed by whitespace
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in sentence_end().find_iter(text) {
        // Keep the punctuation, drop the whitespace
        let end = boundary.start() + 1;
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// The glossary entry mentioned earliest in `text`, if any.
///
/// When two terms start at the same position the longer one wins.
pub fn first_glossary_match(text: &str) -> Option<(&'static str, &'static str)> {
    let lowered = text.to_lowercase();

    GLOSSARY
        .iter()
        .filter_map(|&(term, explanation)| {
            lowered.find(term).map(|pos| (pos, term, explanation))
        })
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())))
        .map(|(_, term, explanation)| (term, explanation))
}

/// First two sentences plus, at most, one glossary explanation
pub fn summarize(text: &str) -> String {
    let sentences = split_sentences(text);
    let mut summary = sentences
        .iter()
        .take(SUMMARY_SENTENCES)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    if let Some((_, explanation)) = first_glossary_match(&summary) {
        if !summary.to_lowercase().contains(&explanation.to_lowercase()) {
            if !summary.is_empty() {
                summary.push(' ');
            }
            summary.push_str(explanation);
        }
    }

    summary
}

/// Clean a raw model reply for display
pub fn process(raw: &str, mode: Verbosity) -> String {
    let stripped = strip_markdown(raw);
    match mode {
        Verbosity::Full => stripped.trim().to_string(),
        Verbosity::Short => summarize(stripped.trim()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatVerdict {
    Alert,
    Clear,
}

impl ThreatVerdict {
    pub fn prefix(&self) -> &'static str {
        match self {
            ThreatVerdict::Alert => ALERT_PREFIX,
            ThreatVerdict::Clear => CLEAR_PREFIX,
        }
    }

    pub fn notification(&self) -> (&'static str, &'static str) {
        match self {
            ThreatVerdict::Alert => ("Security Alert", "Potential security issues detected"),
            ThreatVerdict::Clear => ("Scan Complete", "No immediate security threats detected"),
        }
    }
}

/// Case-insensitive keyword scan of a screen analysis
pub fn classify_threat(text: &str) -> ThreatVerdict {
    let lowered = text.to_lowercase();
    if THREAT_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        ThreatVerdict::Alert
    } else {
        ThreatVerdict::Clear
    }
}
