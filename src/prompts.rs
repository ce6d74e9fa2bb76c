use rand::Rng;

use crate::catalog::Catalog;
use crate::error::GenerateError;

pub const PREAMBLE: &str = "CRITICAL INSTRUCTION: purely visual, no text.";

/// One composed prompt plus the pieces it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
	pub term: String,
	pub scenario: String,
	pub style: String,
	pub text: String,
}

pub fn render(scenario: &str, style_description: &str) -> String {
	format!("{PREAMBLE}\nScene: {scenario}.\nStyle: {style_description}.")
}

/// Picks one scenario for `term` uniformly at random and appends the style.
///
/// Every call draws from `rng` again, so identical inputs can produce
/// different prompts. Callers inject the source: a seeded `StdRng` gives
/// reproducible output.
pub fn build_prompt<R: Rng + ?Sized>(
	catalog: &Catalog,
	term: &str,
	style: &str,
	rng: &mut R,
) -> Result<Prompt, GenerateError> {
	let scenarios = catalog.prompts.scenarios_for(term)?;
	let scenario = &scenarios[rng.random_range(0..scenarios.len())];
	let style_description = catalog.styles.style_description_for(style);
	Ok(Prompt {
		term: term.to_string(),
		scenario: scenario.clone(),
		style: style.to_string(),
		text: render(scenario, style_description),
	})
}
