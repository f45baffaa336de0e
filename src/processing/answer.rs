//! Grounded answer generation.

use crate::completion::{CompletionClient, CompletionClientError, CompletionRequest};
use crate::processing::ScoredPassage;

/// Build the grounding prompt restricting the model to `passages`.
pub fn build_answer_prompt(passages: &[ScoredPassage], question: &str) -> String {
    let context = passages
        .iter()
        .map(|scored| scored.passage.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an AI assistant helping with logistics document analysis.\n\n\
         Answer the question based ONLY on the following context from the document. \
         If the answer is not in the context, say \"Not found in document\".\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer (be specific and cite relevant details):"
    )
}

/// Ask the model to answer `question` from `passages` at temperature 0.
pub async fn generate_answer(
    client: &dyn CompletionClient,
    passages: &[ScoredPassage],
    question: &str,
) -> Result<String, CompletionClientError> {
    let prompt = build_answer_prompt(passages, question);
    client.complete(CompletionRequest::deterministic(prompt)).await
}
