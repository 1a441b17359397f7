//! Reading and answering one question on an open test window.

use color_eyre::Result;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
	Question, QuestionKind, Selection,
	driver::{Frame, PageDriver},
	scripts,
};

/// Classify the question currently shown. Never fails: any breakage during
/// detection is swallowed and treated as radio, the portal's most common type.
pub async fn detect_kind<D: PageDriver>(page: &mut D) -> QuestionKind {
	match try_detect(page).await {
		Ok(kind) => kind,
		Err(e) => {
			warn!("question type detection failed, defaulting to radio: {e:#}");
			QuestionKind::Radio
		}
	}
}

/// Detection proper, in fixed priority order: free-text flag, checkboxes,
/// radios, nested-frame dropdown, then the radio fallback.
pub async fn try_detect<D: PageDriver>(page: &mut D) -> Result<QuestionKind> {
	if page.eval(Frame::Content, scripts::FREE_TEXT_FLAG).await?.as_bool().unwrap_or(false) {
		return Ok(QuestionKind::FreeText);
	}
	if page.eval(Frame::Content, scripts::COUNT_CHECKBOXES).await?.as_u64().unwrap_or(0) > 0 {
		return Ok(QuestionKind::Checkbox);
	}
	if page.eval(Frame::Content, scripts::COUNT_RADIOS).await?.as_u64().unwrap_or(0) > 0 {
		return Ok(QuestionKind::Radio);
	}
	if page.eval(Frame::AnswerList, scripts::HAS_DROPDOWN).await?.as_bool().unwrap_or(false) {
		return Ok(QuestionKind::Dropdown);
	}
	// Known weak spot: an unrecognized layout gets answered as if it were
	// radio. Logged on its own so the mode is visible in the run log.
	warn!("no answer controls found, type undetermined, defaulting to radio");
	Ok(QuestionKind::Radio)
}

#[derive(Debug, Deserialize)]
struct ChoicePayload {
	text: String,
	options: Vec<String>,
}

/// Read the current question. `None` means extraction broke; the caller
/// treats it exactly like a blank question (end of test).
pub async fn extract_question<D: PageDriver>(page: &mut D, kind: QuestionKind) -> Option<Question> {
	match try_extract(page, kind).await {
		Ok(question) => Some(question),
		Err(e) => {
			warn!("question extraction failed: {e:#}");
			None
		}
	}
}

async fn try_extract<D: PageDriver>(page: &mut D, kind: QuestionKind) -> Result<Question> {
	match kind {
		QuestionKind::FreeText => Ok(Question::free_text_sentinel()),
		QuestionKind::Radio | QuestionKind::Checkbox => {
			let script = if kind == QuestionKind::Radio { scripts::READ_RADIO_QUESTION } else { scripts::READ_CHECKBOX_QUESTION };
			let raw = page.eval(Frame::Content, script).await?;
			let payload: ChoicePayload = serde_json::from_str(raw.as_str().unwrap_or("{}")).unwrap_or(ChoicePayload { text: String::new(), options: Vec::new() });
			Ok(Question::new(payload.text, payload.options, kind))
		}
		QuestionKind::Dropdown => {
			let raw = page.eval(Frame::AnswerList, scripts::READ_DROPDOWN_OPTIONS).await?;
			let options: Vec<String> = serde_json::from_str(raw.as_str().unwrap_or("[]")).unwrap_or_default();
			let text = page.eval(Frame::Content, scripts::READ_QUESTION_TEXT).await?.as_str().unwrap_or("").trim().to_string();
			Ok(Question::new(text, options, kind))
		}
	}
}

/// Apply a chosen answer to the page. Returns `false` only when something
/// broke; there is no verification that a click actually registered.
pub async fn apply_selection<D: PageDriver>(page: &mut D, kind: QuestionKind, selection: &Selection) -> bool {
	match try_apply(page, kind, selection).await {
		Ok(()) => true,
		Err(e) => {
			warn!("failed to apply answer selection: {e:#}");
			false
		}
	}
}

async fn try_apply<D: PageDriver>(page: &mut D, kind: QuestionKind, selection: &Selection) -> Result<()> {
	match kind {
		QuestionKind::Radio => {
			let choice = selection.first().copied().unwrap_or(1);
			page.eval(Frame::Content, &scripts::click_radio(choice - 1)).await?;
		}
		// Free-text tests are skipped before any submission happens.
		QuestionKind::FreeText => {}
		QuestionKind::Checkbox =>
			for &choice in selection {
				page.eval(Frame::Content, &scripts::click_checkbox(choice - 1)).await?;
			},
		QuestionKind::Dropdown =>
			// Positional selects ans_1, ans_2, ... paired with the selection
			// values in order; index 0 of each select is the placeholder.
			for (position, &choice) in selection.iter().enumerate() {
				page.eval(Frame::AnswerList, &scripts::set_dropdown(position + 1, choice)).await?;
			},
	}
	debug!("applied {} selection {selection:?}", kind.label());
	Ok(())
}

/// What happened after triggering the navigation affordance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Advance {
	NextQuestion,
	TestCompleted,
	Failed,
}

/// Move the test forward: next question while the forward control is enabled,
/// otherwise finalize (mark) the test, pre-accepting its confirm dialog.
pub async fn advance<D: PageDriver>(page: &mut D) -> Advance {
	match try_advance(page).await {
		Ok(outcome) => outcome,
		Err(e) => {
			warn!("failed to advance the test: {e:#}");
			Advance::Failed
		}
	}
}

async fn try_advance<D: PageDriver>(page: &mut D) -> Result<Advance> {
	let forward_enabled = page.eval(Frame::Control, scripts::FORWARD_ENABLED).await?.as_bool().unwrap_or(false);
	if forward_enabled {
		page.eval(Frame::Control, scripts::CLICK_FORWARD).await?;
		page.settle(std::time::Duration::from_secs(2)).await;
		return Ok(Advance::NextQuestion);
	}

	// Last question: the mark action pops a confirm dialog, accepted by the
	// override planted in the top frame beforehand.
	page.eval(Frame::Top, scripts::OVERRIDE_CONFIRM).await?;
	page.eval(Frame::Control, scripts::CLICK_MARK).await?;
	page.settle(std::time::Duration::from_secs(2)).await;
	Ok(Advance::TestCompleted)
}
