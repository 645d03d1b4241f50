use std::{
	collections::HashMap,
	sync::{
		Mutex,
		atomic::{AtomicU32, AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use recall_config::{EmbeddingProviderConfig, LlmProviderConfig};
use recall_service::{
	BoxFuture, Candidate, CompletionProvider, DocumentStore, EmbeddingProvider, Error, Result,
	VectorIndex, VectorRecord,
};
use recall_storage::models::Note;

/// Each word gets its own axis; the last axis is a constant bias so no vector is zero.
pub const VOCAB: [&str; 15] = [
	"trip",
	"flight",
	"paris",
	"june",
	"groceries",
	"buy",
	"milk",
	"eggs",
	"lisbon",
	"oslo",
	"dentist",
	"appointment",
	"tuesday",
	"passport",
	"renew",
];

const STALL: Duration = Duration::from_secs(3_600);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
	#[default]
	Healthy,
	Failing,
	Stalled,
	/// Embedding only: vectors one axis short.
	WrongDimension,
	/// Completion only: an empty reply.
	Blank,
}

fn read_mode(mode: &Mutex<Mode>) -> Mode {
	*mode.lock().unwrap_or_else(|err| err.into_inner())
}

fn write_mode(mode: &Mutex<Mode>, value: Mode) {
	*mode.lock().unwrap_or_else(|err| err.into_inner()) = value;
}

async fn stall() {
	tokio::time::sleep(STALL).await;
}

pub fn vocab_vector(text: &str) -> Vec<f32> {
	let mut vector = vec![0.0_f32; VOCAB.len() + 1];

	for token in text.split(|c: char| !c.is_alphanumeric()).filter(|token| !token.is_empty()) {
		let token = token.to_lowercase();

		if let Some(idx) = VOCAB.iter().position(|word| *word == token) {
			vector[idx] += 1.0;
		}
	}

	vector[VOCAB.len()] = 0.1;

	vector
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a * norm_b)
}

#[derive(Default)]
pub struct VocabEmbedding {
	pub calls: AtomicUsize,
	mode: Mutex<Mode>,
}
impl VocabEmbedding {
	pub fn set_mode(&self, mode: Mode) {
		write_mode(&self.mode, mode);
	}

	pub fn count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl EmbeddingProvider for VocabEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let mode = read_mode(&self.mode);

		Box::pin(async move {
			match mode {
				Mode::Healthy | Mode::Blank =>
					Ok(texts.iter().map(|text| vocab_vector(text)).collect()),
				Mode::Failing => Err(Error::EmbeddingUnavailable {
					message: "Embedding backend refused the connection.".to_string(),
				}),
				Mode::Stalled => {
					stall().await;

					Ok(texts.iter().map(|text| vocab_vector(text)).collect())
				},
				Mode::WrongDimension => Ok(texts
					.iter()
					.map(|text| {
						let mut vector = vocab_vector(text);

						vector.pop();

						vector
					})
					.collect()),
			}
		})
	}
}

#[derive(Default)]
pub struct MemoryIndex {
	records: RwLock<HashMap<Uuid, VectorRecord>>,
	pub upserts: AtomicUsize,
	pub queries: AtomicUsize,
	pub deletes: AtomicUsize,
	pub last_top_k: AtomicU32,
	mode: Mutex<Mode>,
}
impl MemoryIndex {
	pub fn set_mode(&self, mode: Mode) {
		write_mode(&self.mode, mode);
	}

	pub async fn len(&self) -> usize {
		self.records.read().await.len()
	}

	pub async fn get(&self, note_id: Uuid) -> Option<VectorRecord> {
		self.records.read().await.get(&note_id).cloned()
	}

	/// Writes a record directly, bypassing the indexer.
	pub async fn put(&self, record: VectorRecord) {
		self.records.write().await.insert(record.note_id, record);
	}

	fn check(&self) -> Option<Error> {
		match read_mode(&self.mode) {
			Mode::Failing => Some(Error::IndexUnavailable {
				message: "Vector index returned 503.".to_string(),
			}),
			_ => None,
		}
	}

	fn stalled(&self) -> bool {
		read_mode(&self.mode) == Mode::Stalled
	}
}
impl VectorIndex for MemoryIndex {
	fn upsert<'a>(&'a self, record: &'a VectorRecord) -> BoxFuture<'a, Result<()>> {
		self.upserts.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if self.stalled() {
				stall().await;
			}
			if let Some(err) = self.check() {
				return Err(err);
			}

			self.records.write().await.insert(record.note_id, record.clone());

			Ok(())
		})
	}

	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		owner_id: &'a str,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Candidate>>> {
		self.queries.fetch_add(1, Ordering::SeqCst);
		self.last_top_k.store(top_k, Ordering::SeqCst);

		Box::pin(async move {
			if self.stalled() {
				stall().await;
			}
			if let Some(err) = self.check() {
				return Err(err);
			}

			let records = self.records.read().await;
			let mut hits: Vec<Candidate> = records
				.values()
				.filter(|record| record.owner_id == owner_id)
				.map(|record| Candidate {
					note_id: record.note_id,
					score: cosine(vector, &record.vector),
				})
				.collect();

			hits.sort_by(|a, b| b.score.total_cmp(&a.score));
			hits.truncate(top_k as usize);

			Ok(hits)
		})
	}

	fn delete<'a>(&'a self, note_id: Uuid, owner_id: &'a str) -> BoxFuture<'a, Result<()>> {
		self.deletes.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if let Some(err) = self.check() {
				return Err(err);
			}

			let mut records = self.records.write().await;

			if records.get(&note_id).is_some_and(|record| record.owner_id == owner_id) {
				records.remove(&note_id);
			}

			Ok(())
		})
	}
}

#[derive(Default)]
pub struct MemoryDocuments {
	notes: RwLock<HashMap<Uuid, Note>>,
	pub fetches: AtomicUsize,
	mode: Mutex<Mode>,
}
impl MemoryDocuments {
	pub fn set_mode(&self, mode: Mode) {
		write_mode(&self.mode, mode);
	}

	pub fn count(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}

	pub async fn put(&self, note: Note) {
		self.notes.write().await.insert(note.note_id, note);
	}

	pub async fn remove(&self, note_id: Uuid) {
		self.notes.write().await.remove(&note_id);
	}
}
impl DocumentStore for MemoryDocuments {
	fn fetch_by_ids<'a>(
		&'a self,
		note_ids: &'a [Uuid],
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Note>>> {
		self.fetches.fetch_add(1, Ordering::SeqCst);

		let mode = read_mode(&self.mode);

		Box::pin(async move {
			match mode {
				Mode::Failing =>
					return Err(Error::DocumentStoreUnavailable {
						message: "Connection pool timed out.".to_string(),
					}),
				Mode::Stalled => stall().await,
				_ => {},
			}

			let notes = self.notes.read().await;
			// Reverse request order.
			let found = note_ids
				.iter()
				.rev()
				.filter_map(|id| notes.get(id))
				.filter(|note| note.owner_id == owner_id)
				.cloned()
				.collect();

			Ok(found)
		})
	}
}

/// Answers by quoting the first note of the prompt and records the messages it received.
#[derive(Default)]
pub struct SpyCompletion {
	pub calls: AtomicUsize,
	pub last_messages: Mutex<Vec<Value>>,
	mode: Mutex<Mode>,
}
impl SpyCompletion {
	pub fn set_mode(&self, mode: Mode) {
		write_mode(&self.mode, mode);
	}

	pub fn count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn last_messages(&self) -> Vec<Value> {
		self.last_messages.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl CompletionProvider for SpyCompletion {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		*self.last_messages.lock().unwrap_or_else(|err| err.into_inner()) = messages.to_vec();

		let mode = read_mode(&self.mode);
		let top_note = messages
			.last()
			.and_then(|message| message["content"].as_str())
			.and_then(|content| content.split("Note 1:\n").nth(1))
			.and_then(|rest| rest.split("\n\n").next())
			.unwrap_or_default()
			.to_string();

		Box::pin(async move {
			match mode {
				Mode::Failing => Err(Error::CompletionUnavailable {
					message: "Completion backend returned 500.".to_string(),
				}),
				Mode::Stalled => {
					stall().await;

					Ok(String::new())
				},
				Mode::Blank => Ok(String::new()),
				_ => Ok(format!("According to your notes: {top_note}")),
			}
		})
	}
}
