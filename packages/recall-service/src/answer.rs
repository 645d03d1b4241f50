use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{RecallService, Result, RetrievedNote, Stage, bounded};

/// Returned verbatim when retrieval finds nothing; the model is not called.
pub const NO_RELEVANT_NOTES: &str = "No relevant notes found.";

const GROUNDING_RULES: &str = "\
You answer questions using only the user's notes provided in the message.
Rules:
- Answer only from the given notes.
- If the answer cannot be derived from the notes, say so explicitly.
- Never introduce facts, names, dates, or numbers that do not appear in the notes.
- If the notes cover the question only partially, say which part is missing instead of filling \
the gap.";

#[derive(Clone, Debug, Deserialize)]
pub struct AskRequest {
	pub question: String,
	#[serde(default)]
	pub top_k: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AskResponse {
	pub answer: String,
	/// Note ids the answer was grounded on, in ranked order.
	pub sources: Vec<Uuid>,
}

impl RecallService {
	pub async fn answer(&self, owner_id: &str, question: &str) -> Result<String> {
		let (answer, _) = self.answer_with_sources(owner_id, question, None).await?;

		Ok(answer)
	}

	pub async fn ask(&self, owner_id: &str, req: AskRequest) -> Result<AskResponse> {
		let (answer, retrieved) =
			self.answer_with_sources(owner_id, &req.question, req.top_k).await?;
		let sources = retrieved.iter().map(|item| item.note.note_id).collect();

		Ok(AskResponse { answer, sources })
	}

	async fn answer_with_sources(
		&self,
		owner_id: &str,
		question: &str,
		top_k: Option<u32>,
	) -> Result<(String, Vec<RetrievedNote>)> {
		let retrieved = self.retrieve(owner_id, question, top_k).await?;

		if retrieved.is_empty() {
			return Ok((NO_RELEVANT_NOTES.to_string(), retrieved));
		}

		let messages = build_messages(question, &retrieved);
		let answer = bounded(
			Stage::Completion,
			self.cfg.timeouts.completion(),
			self.providers.completion.complete(&self.cfg.providers.completion, &messages),
		)
		.await?;

		tracing::debug!(owner_id, sources = retrieved.len(), "Answered question.");

		Ok((answer, retrieved))
	}
}

/// Numbers notes from 1 in ranked order.
pub fn render_context(notes: &[RetrievedNote]) -> String {
	let mut out = String::new();

	for (idx, item) in notes.iter().enumerate() {
		if idx > 0 {
			out.push_str("\n\n");
		}

		out.push_str(&format!("Note {}:\nTitle: {}\n{}", idx + 1, item.note.title, item.note.body));
	}

	out
}

pub fn build_messages(question: &str, notes: &[RetrievedNote]) -> Vec<Value> {
	let user_prompt = format!("Notes:\n\n{}\n\nQuestion: {question}", render_context(notes));

	vec![
		serde_json::json!({ "role": "system", "content": GROUNDING_RULES }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}
