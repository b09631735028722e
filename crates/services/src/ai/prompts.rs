use serde::de::DeserializeOwned;
use study_core::model::QuizRequest;

use crate::error::AiError;

const MAX_TITLE_CHARS: usize = 60;
const MAX_DOCUMENT_CHARS: usize = 12_000;

pub(crate) fn title_prompt(seed: &str) -> String {
    format!(
        "Write a short title (at most six words) for a study conversation that starts with \
         the message below. Reply with the title only, no quotes.\n\nMessage:\n{seed}"
    )
}

pub(crate) fn subtopics_prompt(request: &QuizRequest) -> String {
    let mut prompt = format!(
        "List the key subtopics a student should be quizzed on for the topic \"{}\". \
         Reply with a JSON array of short strings and nothing else.",
        request.topic.trim()
    );
    push_document(&mut prompt, request);
    prompt
}

pub(crate) fn question_prompt(
    request: &QuizRequest,
    subtopic: &str,
    index: u32,
    total: u32,
) -> String {
    let mut prompt = format!(
        "Write multiple-choice question {} of {total} for the topic \"{}\", focused on the \
         subtopic \"{subtopic}\". Reply with a single JSON object with the fields \
         \"question\" (string), \"options\" (array of four strings), \"answer\" (exactly one of \
         the options), \"explanation\" (string) and \"wrongExplanation\" (object mapping each \
         wrong option to why it is wrong). Reply with the JSON object only.",
        index + 1,
        request.topic.trim()
    );
    push_document(&mut prompt, request);
    prompt
}

fn push_document(prompt: &mut String, request: &QuizRequest) {
    if let Some(document) = &request.document {
        let excerpt: String = document.content.chars().take(MAX_DOCUMENT_CHARS).collect();
        prompt.push_str("\n\nBase it on this document (");
        prompt.push_str(&document.name);
        prompt.push_str("):\n");
        prompt.push_str(&excerpt);
    }
}

/// First line, without wrapping quotes, capped in length.
pub(crate) fn clean_title(raw: &str) -> Result<String, AiError> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let line = line
        .trim_start_matches(|c| matches!(c, '"' | '\'' | '#' | '*'))
        .trim_end_matches(|c| matches!(c, '"' | '\'' | '*' | '.'))
        .trim();
    if line.is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(line.chars().take(MAX_TITLE_CHARS).collect())
}

/// Parse a JSON reply, tolerating a surrounding Markdown code fence.
pub(crate) fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, AiError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```")
        .map(|rest| {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest)
        })
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| AiError::InvalidReply(e.to_string()))
}
