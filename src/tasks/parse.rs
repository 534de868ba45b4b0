//! Splitting a raw generation into narrative and structured sections.

use crate::character::StructuredOutput;
use crate::wlog_warn;

const NARRATIVE_MARKER: &str = "NARRATIVE:";
const STRUCTURED_MARKER: &str = "STRUCTURED:";

/// A task's parsed response. `degraded` is set when the structured section
/// was replaced by the task's fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse<T> {
    pub narrative: String,
    pub structured: T,
    pub degraded: bool,
}

/// Split a response into its narrative text and raw structured section.
///
/// With exactly one `STRUCTURED:` marker the text splits there. Otherwise
/// the structured section runs from the first `{` to the last `}` and the
/// narrative is everything before it. The section is `None` when there is
/// no closed brace span to take.
pub fn split_response(raw: &str) -> (String, Option<String>) {
    let parts: Vec<&str> = raw.split(STRUCTURED_MARKER).collect();
    if let [narrative, structured] = parts.as_slice() {
        return (
            narrative.replace(NARRATIVE_MARKER, "").trim().to_string(),
            Some(structured.trim().to_string()),
        );
    }

    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => (
            raw[..start].trim().to_string(),
            Some(raw[start..=end].to_string()),
        ),
        (Some(start), _) => (raw[..start].trim().to_string(), None),
        _ => (raw.trim().to_string(), None),
    }
}

/// Drop a surrounding markdown code fence, if any.
fn strip_fence(section: &str) -> &str {
    for fence in ["```json", "```"] {
        if let Some(start) = section.find(fence) {
            let body = &section[start + fence.len()..];
            let end = body.find("```").unwrap_or(body.len());
            return body[..end].trim();
        }
    }
    section.trim()
}

/// Parse a raw response into `T`, degrading to `T::fallback()` on bad data.
pub fn parse_response<T: StructuredOutput>(raw: &str) -> ParsedResponse<T> {
    let (narrative, section) = split_response(raw);
    let Some(section) = section else {
        wlog_warn!(
            "[tasks] {} response has no structured section, using fallback",
            T::KIND
        );
        return degraded(narrative);
    };
    match serde_json::from_str::<T>(strip_fence(&section)) {
        Ok(structured) => ParsedResponse {
            narrative,
            structured,
            degraded: false,
        },
        Err(e) => {
            wlog_warn!(
                "[tasks] {} structured section did not parse, using fallback: {}",
                T::KIND,
                e
            );
            degraded(narrative)
        }
    }
}

fn degraded<T: StructuredOutput>(narrative: String) -> ParsedResponse<T> {
    ParsedResponse {
        narrative,
        structured: T::fallback(),
        degraded: true,
    }
}
