//! Keyword screening for inbound chat messages.

use regex::{RegexSet, RegexSetBuilder};

pub const SCAM_KEYWORDS: [&str; 11] = [
    "lottery",
    "win money",
    "prize",
    "jackpot",
    "free gift",
    "click link",
    "click here",
    "upi",
    "otp",
    "kbc",
    "verification code",
];

pub const SUSPICIOUS_REPLY: &str = "🚨 *Warning: This message looks suspicious!*\n\n\
⚠️ Do NOT click any links.\n\
⚠️ Do NOT share OTP, PIN, or bank details with anyone.\n\n\
If someone is asking for money or personal information, it may be a scam.";

pub const CLEAN_REPLY: &str = "✅ This message does not match common scam patterns.\n\
But always be careful and never share OTP, PIN or bank details.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Suspicious { matched: Vec<String> },
    NoKnownPattern,
}

impl Verdict {
    pub fn is_suspicious(&self) -> bool {
        matches!(self, Verdict::Suspicious { .. })
    }

    pub fn reply(&self) -> &'static str {
        match self {
            Verdict::Suspicious { .. } => SUSPICIOUS_REPLY,
            Verdict::NoKnownPattern => CLEAN_REPLY,
        }
    }
}

/// Case-insensitive substring match against a fixed keyword list.
#[derive(Debug, Clone)]
pub struct KeywordScreen {
    keywords: Vec<String>,
    set: RegexSet,
}

impl KeywordScreen {
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords.into_iter().map(Into::into).collect::<Vec<String>>();
        let set = RegexSetBuilder::new(keywords.iter().map(|keyword| regex::escape(keyword)))
            .case_insensitive(true)
            .build()?;
        Ok(Self { keywords, set })
    }

    pub fn standard() -> Result<Self, regex::Error> {
        Self::new(SCAM_KEYWORDS)
    }

    pub fn screen(&self, text: &str) -> Verdict {
        let matched = self
            .set
            .matches(text)
            .iter()
            .map(|position| self.keywords[position].clone())
            .collect::<Vec<_>>();

        if matched.is_empty() {
            Verdict::NoKnownPattern
        } else {
            Verdict::Suspicious { matched }
        }
    }
}
