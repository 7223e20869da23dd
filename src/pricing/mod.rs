//! Static per-(provider, model) price tables (§4.1).
//!
//! Rates are expressed in USD per million tokens. Tables are compile-time
//! constants — pricing updates ship as code changes, never as data loaded at
//! runtime. An unknown model falls back to the provider's `DEFAULT` pair so
//! metering never silently drops to zero for a newly released model.

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::domain::Provider;

/// USD-per-million-token rate pair for a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub input: Decimal,
    pub output: Decimal,
}

const fn rate(input: Decimal, output: Decimal) -> Rate {
    Rate { input, output }
}

/// OpenAI per-1M-token pricing. Grounded on
/// `original_source/backend/providers/openai_provider.py::OPENAI_PRICING`.
static OPENAI_TABLE: Lazy<HashMap<&'static str, Rate>> = Lazy::new(|| {
    HashMap::from([
        ("gpt-4o", rate(dec!(2.50), dec!(10.00))),
        ("gpt-4o-2024-11-20", rate(dec!(2.50), dec!(10.00))),
        ("gpt-4o-2024-08-06", rate(dec!(2.50), dec!(10.00))),
        ("gpt-4o-2024-05-13", rate(dec!(5.00), dec!(15.00))),
        ("gpt-4o-mini", rate(dec!(0.15), dec!(0.60))),
        ("gpt-4o-mini-2024-07-18", rate(dec!(0.15), dec!(0.60))),
        ("gpt-4-turbo", rate(dec!(10.00), dec!(30.00))),
        ("gpt-4-turbo-2024-04-09", rate(dec!(10.00), dec!(30.00))),
        ("gpt-4-turbo-preview", rate(dec!(10.00), dec!(30.00))),
        ("gpt-4-1106-preview", rate(dec!(10.00), dec!(30.00))),
        ("gpt-4-0125-preview", rate(dec!(10.00), dec!(30.00))),
        ("gpt-4", rate(dec!(30.00), dec!(60.00))),
        ("gpt-4-0613", rate(dec!(30.00), dec!(60.00))),
        ("gpt-4-32k", rate(dec!(60.00), dec!(120.00))),
        ("gpt-4-32k-0613", rate(dec!(60.00), dec!(120.00))),
        ("gpt-3.5-turbo", rate(dec!(0.50), dec!(1.50))),
        ("gpt-3.5-turbo-0125", rate(dec!(0.50), dec!(1.50))),
        ("gpt-3.5-turbo-1106", rate(dec!(1.00), dec!(2.00))),
        ("gpt-3.5-turbo-instruct", rate(dec!(1.50), dec!(2.00))),
        ("o1", rate(dec!(15.00), dec!(60.00))),
        ("o1-2024-12-17", rate(dec!(15.00), dec!(60.00))),
        ("o1-preview", rate(dec!(15.00), dec!(60.00))),
        ("o1-preview-2024-09-12", rate(dec!(15.00), dec!(60.00))),
        ("o1-mini", rate(dec!(3.00), dec!(12.00))),
        ("o1-mini-2024-09-12", rate(dec!(3.00), dec!(12.00))),
        ("o3-mini", rate(dec!(1.10), dec!(4.40))),
        ("o3-mini-2025-01-31", rate(dec!(1.10), dec!(4.40))),
        ("text-embedding-3-small", rate(dec!(0.02), dec!(0.00))),
        ("text-embedding-3-large", rate(dec!(0.13), dec!(0.00))),
        ("text-embedding-ada-002", rate(dec!(0.10), dec!(0.00))),
    ])
});

static OPENAI_DEFAULT: Rate = rate(dec!(10.00), dec!(30.00));

/// Anthropic per-1M-token pricing. Grounded on
/// `original_source/backend/providers/anthropic_provider.py::ANTHROPIC_PRICING`.
static ANTHROPIC_TABLE: Lazy<HashMap<&'static str, Rate>> = Lazy::new(|| {
    HashMap::from([
        ("claude-3-5-sonnet-20241022", rate(dec!(3.00), dec!(15.00))),
        ("claude-3-5-sonnet-latest", rate(dec!(3.00), dec!(15.00))),
        ("claude-3-5-sonnet-20240620", rate(dec!(3.00), dec!(15.00))),
        ("claude-3-5-haiku-20241022", rate(dec!(0.80), dec!(4.00))),
        ("claude-3-5-haiku-latest", rate(dec!(0.80), dec!(4.00))),
        ("claude-3-opus-20240229", rate(dec!(15.00), dec!(75.00))),
        ("claude-3-opus-latest", rate(dec!(15.00), dec!(75.00))),
        ("claude-3-sonnet-20240229", rate(dec!(3.00), dec!(15.00))),
        ("claude-3-haiku-20240307", rate(dec!(0.25), dec!(1.25))),
        ("claude-2.1", rate(dec!(8.00), dec!(24.00))),
        ("claude-2.0", rate(dec!(8.00), dec!(24.00))),
        ("claude-instant-1.2", rate(dec!(0.80), dec!(2.40))),
    ])
});

static ANTHROPIC_DEFAULT: Rate = rate(dec!(3.00), dec!(15.00));

/// Google Gemini per-1M-token pricing. Grounded on
/// `original_source/backend/providers/google_provider.py::GOOGLE_PRICING`.
static GOOGLE_TABLE: Lazy<HashMap<&'static str, Rate>> = Lazy::new(|| {
    HashMap::from([
        ("gemini-2.0-flash", rate(dec!(0.10), dec!(0.40))),
        ("gemini-2.0-flash-001", rate(dec!(0.10), dec!(0.40))),
        ("gemini-1.5-pro", rate(dec!(1.25), dec!(5.00))),
        ("gemini-1.5-pro-002", rate(dec!(1.25), dec!(5.00))),
        ("gemini-1.5-pro-001", rate(dec!(1.25), dec!(5.00))),
        ("gemini-1.5-flash", rate(dec!(0.075), dec!(0.30))),
        ("gemini-1.5-flash-002", rate(dec!(0.075), dec!(0.30))),
        ("gemini-1.5-flash-001", rate(dec!(0.075), dec!(0.30))),
        ("gemini-1.5-flash-8b", rate(dec!(0.0375), dec!(0.15))),
        ("gemini-1.5-flash-8b-001", rate(dec!(0.0375), dec!(0.15))),
        ("gemini-1.0-pro", rate(dec!(0.50), dec!(1.50))),
        ("gemini-pro", rate(dec!(0.50), dec!(1.50))),
        ("text-embedding-004", rate(dec!(0.00), dec!(0.00))),
    ])
});

static GOOGLE_DEFAULT: Rate = rate(dec!(1.25), dec!(5.00));

fn table_for(provider: Provider) -> (&'static Lazy<HashMap<&'static str, Rate>>, Rate) {
    match provider {
        Provider::Openai => (&OPENAI_TABLE, OPENAI_DEFAULT),
        Provider::Anthropic => (&ANTHROPIC_TABLE, ANTHROPIC_DEFAULT),
        Provider::Google => (&GOOGLE_TABLE, GOOGLE_DEFAULT),
    }
}

/// Looks up the rate pair for `(provider, model)`, falling back to the
/// provider's default when the model is unknown.
pub fn rate_for(provider: Provider, model: &str) -> Rate {
    let (table, default) = table_for(provider);
    table.get(model).copied().unwrap_or(default)
}

/// Computes `cost_usd` per §4.1, rounded to six decimal places.
pub fn price(provider: Provider, model: &str, input_tokens: i64, output_tokens: i64) -> Decimal {
    let r = rate_for(provider, model);
    let million = Decimal::from(1_000_000);
    let cost =
        Decimal::from(input_tokens) * r.input / million + Decimal::from(output_tokens) * r.output / million;
    cost.round_dp(6)
}

/// Enumerates every `(provider, model)` pair this table knows, used by the
/// aggregator's provider-comparison rollup (§4.8) to compute "what would this
/// call have cost elsewhere".
pub fn all_models() -> Vec<(Provider, &'static str)> {
    let mut out = Vec::new();
    for p in [Provider::Openai, Provider::Anthropic, Provider::Google] {
        let (table, _) = table_for(p);
        out.extend(table.keys().map(|&m| (p, m)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_1_unary_meter() {
        let cost = price(Provider::Openai, "gpt-4o", 1000, 500);
        assert_eq!(cost, dec!(0.0075));
    }

    #[test]
    fn unknown_model_uses_provider_default_not_zero() {
        let cost = price(Provider::Openai, "some-future-model", 1_000_000, 1_000_000);
        assert_eq!(cost, dec!(10.00) + dec!(30.00));
        assert!(cost > Decimal::ZERO);
    }

    #[test]
    fn zero_tokens_price_to_zero() {
        assert_eq!(price(Provider::Anthropic, "claude-3-opus-20240229", 0, 0), Decimal::ZERO);
    }

    #[test]
    fn rounds_to_six_decimal_places() {
        let cost = price(Provider::Google, "gemini-1.5-flash-8b", 1, 1);
        assert_eq!(cost.scale(), 6);
    }
}
