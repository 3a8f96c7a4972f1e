// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Attribute keys used in canonical events.
//!
//! The ingestion service indexes on these names; renaming one is a breaking
//! change for every dashboard built on top of it.

pub const MODEL: &str = "model";
pub const PROVIDER: &str = "provider";
pub const INPUT: &str = "input";
pub const OUTPUT: &str = "output";
pub const PARAMETERS: &str = "parameters";
pub const STATUS: &str = "status";
pub const STREAMING: &str = "streaming";
pub const FINISH_REASON: &str = "finish_reason";
pub const TOOL_CALLS: &str = "tool_calls";

pub const INPUT_TOKENS: &str = "input_tokens";
pub const OUTPUT_TOKENS: &str = "output_tokens";
pub const TOTAL_TOKENS: &str = "total_tokens";
pub const COST_USD: &str = "cost_usd";
pub const LATENCY_MS: &str = "latency_ms";
pub const TIME_TO_FIRST_TOKEN_MS: &str = "time_to_first_token_ms";
pub const CHUNK_COUNT: &str = "chunk_count";

pub const TOOL_NAME: &str = "tool_name";
pub const TOOL_ARGS: &str = "args";
pub const TOOL_RESULT: &str = "result";

pub const ERROR_TYPE: &str = "error_type";
pub const ERROR_CATEGORY: &str = "error_category";
pub const ERROR_CODE: &str = "error_code";
pub const ERROR_MESSAGE: &str = "error_message";

pub const FEEDBACK_TYPE: &str = "feedback_type";
pub const RATING: &str = "rating";
pub const COMMENT: &str = "comment";
pub const CORRECTION: &str = "correction";

pub const TRACE_NAME: &str = "name";
pub const METADATA: &str = "metadata";
pub const OUTCOME: &str = "outcome";
pub const DURATION_MS: &str = "duration_ms";
pub const EVENT_COUNT: &str = "event_count";
pub const ERROR_COUNT: &str = "error_count";
pub const LAST_ERROR: &str = "last_error";

pub const QUERY: &str = "query";
pub const DOCUMENT_COUNT: &str = "document_count";
pub const TOP_K: &str = "top_k";
pub const DIMENSIONS: &str = "dimensions";
pub const INPUT_COUNT: &str = "input_count";
pub const OPERATION: &str = "operation";
pub const COLLECTION: &str = "collection";
pub const CACHE_HIT: &str = "hit";
pub const CACHE_KEY: &str = "key";
