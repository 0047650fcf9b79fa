use ragway_core::types::Verdict;

/// First ASCII digit in the reply, if it names a verdict.
pub fn parse_verdict(reply: &str) -> Option<Verdict> {
    let digit = reply.chars().find(char::is_ascii_digit)?;
    Verdict::from_code(digit.to_digit(10)?)
}

/// Classifier replies are free text; anything unreadable counts as `Unclear`.
pub fn classify_reply(reply: &str) -> Verdict {
    parse_verdict(reply).unwrap_or_else(|| {
        let excerpt: String = reply.chars().take(80).collect();
        tracing::warn!(reply = %excerpt, "classifier reply had no usable verdict digit");
        Verdict::Unclear
    })
}
