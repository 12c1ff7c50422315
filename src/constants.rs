/// Upstream API origin.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model used when the client omits one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// max_tokens fallback; the upstream field is mandatory while OpenAI
/// clients routinely omit it.
pub const DEFAULT_MAX_TOKENS: u32 = 16000;

/// Request body cap unless overridden via CLAUDE_RELAY_MAX_BODY_BYTES.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Models advertised on /v1/models. The upstream models endpoint does not
/// accept OAuth tokens, so the list is served statically.
pub static MODELS: &[&str] = &[
    "claude-opus-4-6",
    "claude-opus-4-5",
    "claude-sonnet-4-6",
    "claude-sonnet-4-5",
    "claude-haiku-4-5",
    "claude-opus-4-1",
    "claude-sonnet-4-0",
];
