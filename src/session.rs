//! One test, end to end: detect -> extract -> solve -> submit, looped until
//! the portal stops producing questions.

use tracing::{info, warn};

use crate::{
	QuestionKind, TestOutcome,
	driver::PageDriver,
	oracle::{AnswerOracle, QuotaExhausted},
	quiz::{self, Advance},
};

/// Hard ceiling on questions answered within one test. Real tests are far
/// smaller; the cap only guards against a page that never stops advancing.
pub const MAX_QUESTIONS_PER_TEST: usize = 50;

/// Drive one open test window to a terminal outcome. Per-question breakage is
/// folded into the outcome; only quota exhaustion escapes as an error.
pub async fn run_test<D: PageDriver, O: AnswerOracle>(page: &mut D, oracle: &O) -> Result<TestOutcome, QuotaExhausted> {
	let mut answered: u32 = 0;

	for _ in 0..MAX_QUESTIONS_PER_TEST {
		let kind = quiz::detect_kind(page).await;

		let Some(question) = quiz::extract_question(page, kind).await else {
			// Extraction broke; same terminal rule as running out of questions.
			return Ok(out_of_questions(answered));
		};

		if question.kind == QuestionKind::FreeText {
			info!("test wants a free-text answer, skipping it entirely");
			return Ok(TestOutcome::SkippedUnsupported);
		}

		if question.is_blank() {
			return Ok(out_of_questions(answered));
		}

		info!("question {} [{}]:\n{question}", answered + 1, kind.label());

		let selection = oracle.solve(&question).await?;
		info!("chosen option(s): {selection:?}");

		if !quiz::apply_selection(page, kind, &selection).await {
			return Ok(TestOutcome::Failed);
		}

		match quiz::advance(page).await {
			Advance::NextQuestion => answered += 1,
			Advance::TestCompleted => {
				answered += 1;
				info!("test finalized after {answered} question(s)");
				return Ok(TestOutcome::Completed { answered });
			}
			Advance::Failed => return Ok(TestOutcome::Failed),
		}
	}

	// Cap reached while the page kept serving questions; should not happen on
	// real tests.
	warn!("question cap ({MAX_QUESTIONS_PER_TEST}) reached without the test finalizing");
	Ok(out_of_questions(answered))
}

/// No more questions could be read: success when anything was answered,
/// failure when the test produced nothing at all.
fn out_of_questions(answered: u32) -> TestOutcome {
	if answered > 0 { TestOutcome::Completed { answered } } else { TestOutcome::Failed }
}
