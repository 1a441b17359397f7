use std::fmt;

use derive_new::new;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod driver;
pub mod login;
pub mod oracle;
pub mod quiz;
pub mod scripts;
pub mod session;
pub mod subject;

/// How the current test question expects its answer.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QuestionKind {
	/// Single choice via radio controls.
	Radio,
	/// Multiple choice via checkbox controls.
	Checkbox,
	/// One or more positional `ans_N` select controls in the nested list frame.
	Dropdown,
	/// Free-text answer field. Not solvable here; the whole test is skipped.
	FreeText,
}

impl QuestionKind {
	pub fn label(&self) -> &'static str {
		match self {
			Self::Radio => "radio",
			Self::Checkbox => "checkbox",
			Self::Dropdown => "dropdown",
			Self::FreeText => "free-text",
		}
	}
}

/// One extracted test question. Immutable once read from the page.
///
/// Empty `text` or empty `options` means "no question present" and ends the
/// test loop; there is no explicit last-question marker on the portal.
#[derive(Clone, Debug, Deserialize, Serialize, new)]
pub struct Question {
	pub text: String,
	/// Option labels in DOM order. Answers refer to these 1-based.
	pub options: Vec<String>,
	pub kind: QuestionKind,
}

impl Question {
	/// Sentinel for unsupported free-text questions.
	pub fn free_text_sentinel() -> Self {
		Self::new(String::new(), Vec::new(), QuestionKind::FreeText)
	}

	pub fn is_blank(&self) -> bool {
		self.text.is_empty() || self.options.is_empty()
	}
}

impl fmt::Display for Question {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{}", self.text)?;
		let marker = match self.kind {
			QuestionKind::Checkbox => "[ ]",
			_ => "( )",
		};
		for (i, option) in self.options.iter().enumerate() {
			writeln!(f, "{marker} {}. {option}", i + 1)?;
		}
		Ok(())
	}
}

/// Chosen answer: 1-based indices into `Question::options`, in the order the
/// oracle produced them. Length 1 for radio/dropdown, >= 1 for checkbox.
pub type Selection = Vec<usize>;

/// Terminal classification of one test attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestOutcome {
	/// The test ran out of questions after at least one answer was submitted.
	Completed { answered: u32 },
	/// The first question needed a free-text answer; nothing was submitted.
	SkippedUnsupported,
	/// Nothing was answered, or submission/advance broke mid-test.
	Failed,
}
