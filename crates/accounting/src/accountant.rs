//! The cost accountant: token resolution and call pricing.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use switchboard_core::trace::round6;

use crate::pricing::{ModelPricing, PricingTable};

/// Backends often echo their usage in prose ("Input tokens: 123"). These
/// patterns pull those counts out; the first match per direction wins.
static INPUT_TOKENS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:input|prompt)[_\s]*tokens?[:\s]*(\d+)").unwrap());
static OUTPUT_TOKENS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:output|completion)[_\s]*tokens?[:\s]*(\d+)").unwrap());

/// Fully-resolved tokens and costs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Prices calls against a [`PricingTable`].
///
/// Each direction resolves independently: an explicitly reported count beats
/// a count extracted from the response text, which beats a character-based
/// estimate. The estimate is `ceil(chars / 4)`; there is no exact tokenizer
/// here and the numbers are accounting figures, not billing ground truth.
pub struct CostAccountant {
    pricing: PricingTable,
    default_model: String,
}

impl CostAccountant {
    pub fn new(pricing: PricingTable, default_model: impl Into<String>) -> Self {
        Self {
            pricing,
            default_model: default_model.into(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Estimate a token count from text. Empty text is zero tokens; anything
    /// else is at least one.
    pub fn count_tokens(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() as u64).div_ceil(4)
    }

    /// Scan text for embedded usage counts, returning
    /// `(input_tokens, output_tokens)`. Counts too large for `u64` are
    /// treated as absent.
    pub fn extract_tokens(&self, text: &str) -> (Option<u64>, Option<u64>) {
        let input = INPUT_TOKENS_RE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        let output = OUTPUT_TOKENS_RE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        (input, output)
    }

    /// Resolve tokens and price one call.
    ///
    /// `actual_input` / `actual_output` are counts explicitly reported by
    /// the caller and take priority. Unknown models resolve through the
    /// default model's pricing row.
    pub fn price_call(
        &self,
        query: &str,
        response: &str,
        model: &str,
        actual_input: Option<u64>,
        actual_output: Option<u64>,
    ) -> CostBreakdown {
        let (extracted_input, extracted_output) = self.extract_tokens(response);

        let input_tokens = actual_input
            .or(extracted_input)
            .unwrap_or_else(|| self.count_tokens(query));
        let output_tokens = actual_output
            .or(extracted_output)
            .unwrap_or_else(|| self.count_tokens(response));

        let pricing = self.pricing.resolve(model, &self.default_model);
        let breakdown = self.breakdown(model, input_tokens, output_tokens, &pricing);
        debug!(
            model = %model,
            input_tokens = breakdown.input_tokens,
            output_tokens = breakdown.output_tokens,
            total_cost = breakdown.total_cost,
            "Priced call"
        );
        breakdown
    }

    fn breakdown(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        pricing: &ModelPricing,
    ) -> CostBreakdown {
        let input_cost = pricing.input_cost(input_tokens);
        let output_cost = pricing.output_cost(output_tokens);
        CostBreakdown {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            input_cost,
            output_cost,
            total_cost: round6(input_cost + output_cost),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accountant() -> CostAccountant {
        CostAccountant::new(PricingTable::with_defaults(), "gpt-4o-mini")
    }

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(accountant().count_tokens(""), 0);
    }

    #[test]
    fn short_text_is_at_least_one_token() {
        assert_eq!(accountant().count_tokens("a"), 1);
        assert_eq!(accountant().count_tokens("abc"), 1);
        assert_eq!(accountant().count_tokens("abcd"), 1);
        assert_eq!(accountant().count_tokens("abcde"), 2);
    }

    #[test]
    fn count_is_ceiling_of_quarter_chars() {
        let text = "x".repeat(101);
        assert_eq!(accountant().count_tokens(&text), 26);
    }

    #[test]
    fn extracts_both_directions_case_insensitive() {
        let text = "Usage: Input Tokens: 150, output_tokens: 42";
        let (input, output) = accountant().extract_tokens(text);
        assert_eq!(input, Some(150));
        assert_eq!(output, Some(42));
    }

    #[test]
    fn extracts_prompt_and_completion_aliases() {
        let text = "prompt tokens 88\ncompletion tokens 17";
        let (input, output) = accountant().extract_tokens(text);
        assert_eq!(input, Some(88));
        assert_eq!(output, Some(17));
    }

    #[test]
    fn first_match_wins() {
        let text = "input tokens: 10 and later input tokens: 99";
        let (input, _) = accountant().extract_tokens(text);
        assert_eq!(input, Some(10));
    }

    #[test]
    fn overflowing_count_is_ignored() {
        let text = "input tokens: 99999999999999999999999999";
        let (input, output) = accountant().extract_tokens(text);
        assert_eq!(input, None);
        assert_eq!(output, None);
    }

    #[test]
    fn empty_call_costs_nothing() {
        let breakdown = accountant().price_call("", "", "gpt-4o-mini", None, None);
        assert_eq!(breakdown.input_tokens, 0);
        assert_eq!(breakdown.output_tokens, 0);
        assert_eq!(breakdown.total_tokens, 0);
        assert_eq!(breakdown.input_cost, 0.0);
        assert_eq!(breakdown.output_cost, 0.0);
        assert_eq!(breakdown.total_cost, 0.0);
    }

    #[test]
    fn no_counts_in_plain_text() {
        let (input, output) = accountant().extract_tokens("just an ordinary answer");
        assert_eq!(input, None);
        assert_eq!(output, None);
    }

    #[test]
    fn actuals_beat_extraction_and_estimation() {
        let breakdown = accountant().price_call(
            "what is the weather",
            "input tokens: 500, output tokens: 600",
            "gpt-4o-mini",
            Some(10),
            Some(20),
        );
        assert_eq!(breakdown.input_tokens, 10);
        assert_eq!(breakdown.output_tokens, 20);
    }

    #[test]
    fn extraction_beats_estimation_per_direction() {
        // Only an output count is embedded; input falls back to the estimate.
        let query = "x".repeat(40); // 10 tokens
        let breakdown =
            accountant().price_call(&query, "output tokens: 7", "gpt-4o-mini", None, None);
        assert_eq!(breakdown.input_tokens, 10);
        assert_eq!(breakdown.output_tokens, 7);
    }

    #[test]
    fn estimation_when_nothing_reported() {
        let breakdown = accountant().price_call("abcd", "abcdefgh", "gpt-4o-mini", None, None);
        assert_eq!(breakdown.input_tokens, 1);
        assert_eq!(breakdown.output_tokens, 2);
        assert_eq!(breakdown.total_tokens, 3);
    }

    #[test]
    fn totals_are_consistent() {
        let breakdown = accountant().price_call(
            "q",
            "r",
            "gpt-4o",
            Some(1000),
            Some(2000),
        );
        assert_eq!(breakdown.total_tokens, 3000);
        assert!((breakdown.input_cost - 0.005).abs() < 1e-10);
        assert!((breakdown.output_cost - 0.03).abs() < 1e-10);
        assert!((breakdown.total_cost - round6(breakdown.input_cost + breakdown.output_cost)).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_priced_with_default() {
        let known = accountant().price_call("q", "r", "gpt-4o-mini", Some(1000), Some(1000));
        let unknown = accountant().price_call("q", "r", "mystery-9000", Some(1000), Some(1000));
        assert_eq!(known.input_cost, unknown.input_cost);
        assert_eq!(known.output_cost, unknown.output_cost);
        assert_eq!(unknown.model, "mystery-9000");
    }
}
