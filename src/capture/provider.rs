// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider inference from model names.

/// Provider reported when nothing in the model name identifies one.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Model-family markers and the provider they imply, checked in order.
const FAMILIES: &[(&str, &str)] = &[
    ("gpt", "openai"),
    ("text-embedding", "openai"),
    ("davinci", "openai"),
    ("claude", "anthropic"),
    ("gemini", "google"),
    ("mistral", "mistral"),
    ("mixtral", "mistral"),
    ("llama", "meta"),
    ("command", "cohere"),
    ("grok", "xai"),
    ("deepseek", "deepseek"),
];

/// OpenAI reasoning models; too short to match as substrings, so they must
/// be a whole token of the name.
const REASONING_MODELS: &[&str] = &["o1", "o3", "o4"];

/// Infer the provider from a model identifier.
///
/// Matching is case-insensitive and looks anywhere in the name, so
/// fine-tuned (`ft:gpt-4o-mini:org::id`), deployment (`azure-gpt-4`) and
/// regional (`us.anthropic.claude-3-haiku`) identifiers resolve.
pub fn infer_provider(model: &str) -> &'static str {
    let lowered = model.trim().to_ascii_lowercase();

    if let Some((_, provider)) = FAMILIES.iter().find(|(family, _)| lowered.contains(family)) {
        return *provider;
    }
    let reasoning = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| REASONING_MODELS.contains(&token));
    if reasoning {
        return "openai";
    }
    UNKNOWN_PROVIDER
}

/// An explicit, non-blank provider always wins over inference.
pub fn resolve_provider(explicit: Option<&str>, model: &str) -> String {
    match explicit.map(str::trim).filter(|p| !p.is_empty()) {
        Some(provider) => provider.to_string(),
        None => infer_provider(model).to_string(),
    }
}
