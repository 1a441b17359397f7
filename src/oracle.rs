//! Remote answer oracle. One POST per question, no retries; every failure
//! path degrades to a concrete (possibly wrong) selection except quota
//! exhaustion, which aborts the whole run.

use std::time::Duration;

use color_eyre::eyre::eyre;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{Question, QuestionKind, Selection};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The endpoint reported rate-limit/quota exhaustion. Continuing would only
/// submit fallback answers everywhere, so the run terminates instead.
#[derive(Debug, Error)]
#[error("text-generation endpoint returned HTTP 429 (quota exhausted)")]
pub struct QuotaExhausted;

/// Picks an answer for one question. The only error that may cross this
/// boundary is [`QuotaExhausted`].
pub trait AnswerOracle {
	fn solve(&self, question: &Question) -> impl Future<Output = Result<Selection, QuotaExhausted>>;
}

/// Gemini-style text-generation client.
#[derive(Clone, Debug)]
pub struct GeminiOracle {
	http: reqwest::Client,
	api_key: String,
	endpoint: String,
}

impl GeminiOracle {
	pub fn new(api_key: &str, model: &str) -> Self {
		Self {
			http: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
			api_key: api_key.to_string(),
			endpoint: format!("https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"),
		}
	}

	async fn request(&self, prompt: &str) -> Result<String, color_eyre::Report> {
		let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
		let response = self.http.post(&self.endpoint).header("X-goog-api-key", &self.api_key).json(&body).send().await?;

		let status = response.status();
		if status == StatusCode::TOO_MANY_REQUESTS {
			return Err(QuotaExhausted.into());
		}
		if !status.is_success() {
			return Err(eyre!("text-generation endpoint returned HTTP {status}"));
		}

		let payload: Value = response.json().await?;
		payload["candidates"][0]["content"]["parts"][0]["text"]
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| eyre!("response body carried no answer text"))
	}
}

impl AnswerOracle for GeminiOracle {
	async fn solve(&self, question: &Question) -> Result<Selection, QuotaExhausted> {
		if question.is_blank() {
			return Ok(vec![1]);
		}

		let prompt = build_prompt(question);
		match self.request(&prompt).await {
			Ok(reply) => {
				debug!("oracle raw reply: {reply}");
				Ok(parse_selection(&reply, question.options.len()))
			}
			Err(e) => match e.downcast::<QuotaExhausted>() {
				Ok(quota) => Err(quota),
				Err(e) => {
					warn!("oracle request failed, falling back to option 1: {e}");
					Ok(vec![1])
				}
			},
		}
	}
}

fn build_prompt(question: &Question) -> String {
	let mut options = String::new();
	for (i, option) in question.options.iter().enumerate() {
		options.push_str(&format!("{}. {option}\n", i + 1));
	}

	let instruction = match question.kind {
		QuestionKind::Checkbox => "One or more options may be correct. Reply with ONLY the number(s) of the correct option(s), separated by spaces.",
		_ => "Exactly one option is correct. Reply with ONLY the number of the correct option.",
	};

	format!(
		"You are answering a question from an online test.\n\n\
		 Question:\n{text}\n\n\
		 Options:\n{options}\n\
		 {instruction}",
		text = question.text,
	)
}

/// Pull every maximal digit run out of the reply, keep the in-range ones in
/// order of first appearance, and fall back to `[1]` when nothing usable
/// remains.
pub fn parse_selection(reply: &str, option_count: usize) -> Selection {
	let digits = match Regex::new(r"\d+") {
		Ok(re) => re,
		Err(_) => return vec![1],
	};

	let mut selection = Selection::new();
	for run in digits.find_iter(reply) {
		let Ok(n) = run.as_str().parse::<usize>() else { continue };
		if n >= 1 && n <= option_count && !selection.contains(&n) {
			selection.push(n);
		}
	}

	if selection.is_empty() { vec![1] } else { selection }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_number_reply() {
		assert_eq!(parse_selection("2", 3), vec![2]);
	}

	#[test]
	fn prose_around_numbers() {
		assert_eq!(parse_selection("The correct answers are 1 and 3.", 4), vec![1, 3]);
	}

	#[test]
	fn order_of_first_appearance_kept() {
		assert_eq!(parse_selection("3, then 1", 3), vec![3, 1]);
	}

	#[test]
	fn duplicates_collapse_to_first() {
		assert_eq!(parse_selection("2, 2 and 2", 3), vec![2]);
	}

	#[test]
	fn out_of_range_numbers_dropped() {
		assert_eq!(parse_selection("5", 3), vec![1]);
		assert_eq!(parse_selection("0 and 2", 3), vec![2]);
	}

	#[test]
	fn maximal_digit_runs_not_split() {
		// "12" must parse as twelve, not one-then-two
		assert_eq!(parse_selection("option 12", 3), vec![1]);
		assert_eq!(parse_selection("option 12", 15), vec![12]);
	}

	#[test]
	fn garbage_falls_back_to_first_option() {
		assert_eq!(parse_selection("no idea, sorry", 3), vec![1]);
		assert_eq!(parse_selection("", 3), vec![1]);
	}

	#[tokio::test]
	async fn blank_question_never_hits_the_network() {
		// endpoint is unroutable; a blank question must short-circuit before it
		let oracle = GeminiOracle::new("key", "model");
		let selection = oracle.solve(&Question::free_text_sentinel()).await.expect("blank question is not fatal");
		assert_eq!(selection, vec![1]);
	}
}
