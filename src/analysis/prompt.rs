//! Prompt templates and placeholder substitution.

use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::PipelineError;

pub const DEFAULT_BATCH_PROMPT: &str = "\
You are a brand-perception analyst studying YouTube audience reactions to {{BRAND_NAME}}.

Below is one batch of videos about {{TOPIC_NAME}} with their public statistics,
a sample of viewer comments and, where available, spoken transcripts.

## Videos
{{VIDEO_METADATA}}

## Comments
{{COMMENTS_DATA}}

## Transcripts
{{TRANSCRIPTS}}

## Media files
{{MEDIA_FILES_LIST}}

Summarise this batch in Markdown:
1. Overall sentiment (positive / neutral / negative) with a short justification.
2. Recurring praise and recurring complaints, each with representative quotes.
3. Notable creators or videos driving the conversation.
4. Emerging themes or risks worth tracking.
";

pub const DEFAULT_SYNTHESIS_PROMPT: &str = "\
You are a senior brand strategist. Combine the batch summaries below into one
strategic report on how YouTube audiences perceive {{BRAND_NAME}}.

Dataset: {{TOTAL_VIDEOS}} videos about {{TOPIC_NAME}}, {{TOTAL_VIEWS}} views,
{{TOTAL_LIKES}} likes, {{TOTAL_COMMENTS_STATS}} comments reported by YouTube,
total engagement {{TOTAL_ENGAGEMENT}}, {{TOTAL_COMMENTS_EXTRACTED}} comments analysed.

## Batch summaries
{{BATCH_SUMMARIES}}

Write the report in Markdown with these sections:
## Executive Summary
## Sentiment Overview
## Key Themes
## Opportunities
## Risks
## Recommendations
";

/// Load a prompt template, falling back to the built-in default when the file is absent
pub fn load_template(path: &Path, default: &str, label: &str) -> Result<String, PipelineError> {
    match std::fs::read_to_string(path) {
        Ok(template) => Ok(template),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "⚠️  {} not found at {}, using built-in default",
                label,
                path.display()
            );
            Ok(default.to_string())
        }
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Replace every `{{KEY}}` placeholder with its value in a single pass.
///
/// Substituted text is never rescanned, so `{{...}}` inside comments or model
/// output stays literal. Unknown keys are left as written.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("static regex"));

    re.replace_all(template, |caps: &Captures| {
        values
            .iter()
            .find(|(key, _)| *key == &caps[1])
            .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
    })
    .into_owned()
}

/// Format an integer with comma thousands separators
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_fill_replaces_all_occurrences() {
        let filled = fill(
            "{{BRAND_NAME}} and {{BRAND_NAME}} on {{TOPIC_NAME}} {{UNKNOWN}}",
            &[("BRAND_NAME", "AcmeCo"), ("TOPIC_NAME", "gadgets")],
        );
        assert_eq!(filled, "AcmeCo and AcmeCo on gadgets {{UNKNOWN}}");
    }

    #[test]
    fn test_fill_does_not_rescan_substituted_text() {
        let filled = fill(
            "{{COMMENTS_DATA}} / {{BRAND_NAME}}",
            &[
                ("COMMENTS_DATA", "- love {{BRAND_NAME}} and {{TRANSCRIPTS}}"),
                ("BRAND_NAME", "AcmeCo"),
                ("TRANSCRIPTS", "leaked"),
            ],
        );
        assert_eq!(filled, "- love {{BRAND_NAME}} and {{TRANSCRIPTS}} / AcmeCo");
    }

    #[test]
    fn test_load_template_falls_back_to_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");
        let template = load_template(&missing, DEFAULT_BATCH_PROMPT, "Batch prompt").unwrap();
        assert_eq!(template, DEFAULT_BATCH_PROMPT);

        let present = dir.path().join("prompt.txt");
        std::fs::write(&present, "custom {{BRAND_NAME}}").unwrap();
        assert_eq!(
            load_template(&present, DEFAULT_BATCH_PROMPT, "Batch prompt").unwrap(),
            "custom {{BRAND_NAME}}"
        );
    }

    #[test]
    fn test_default_prompts_carry_their_placeholders() {
        for key in ["VIDEO_METADATA", "COMMENTS_DATA", "TRANSCRIPTS", "MEDIA_FILES_LIST"] {
            assert!(DEFAULT_BATCH_PROMPT.contains(&format!("{{{{{}}}}}", key)));
        }
        for key in ["BATCH_SUMMARIES", "TOTAL_VIDEOS", "TOTAL_COMMENTS_EXTRACTED"] {
            assert!(DEFAULT_SYNTHESIS_PROMPT.contains(&format!("{{{{{}}}}}", key)));
        }
    }
}
