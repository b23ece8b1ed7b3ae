//! The closed set of upstream API providers.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Deepseek,
    Openai,
    Anthropic,
    Perplexity,
}

impl Provider {
    /// Every provider, in configuration display order.
    pub const ALL: [Self; 4] = [Self::Deepseek, Self::Openai, Self::Anthropic, Self::Perplexity];

    /// Providers eligible for the primary model slot, best first.
    /// Perplexity is search-only and never primary.
    pub const PRIMARY_PRIORITY: [Self; 3] = [Self::Deepseek, Self::Openai, Self::Anthropic];

    pub fn is_primary_capable(self) -> bool {
        Self::PRIMARY_PRIORITY.contains(&self)
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek",
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Perplexity => "perplexity",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Deepseek => "DeepSeek",
            Self::Openai => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Perplexity => "Perplexity",
        }
    }

    /// Model used when this provider holds the primary slot, and for the
    /// one-token completion probe.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek-chat",
            Self::Openai => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-20241022",
            Self::Perplexity => "sonar",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::Provider;

    #[test]
    fn perplexity_is_never_primary() {
        assert!(!Provider::Perplexity.is_primary_capable());
        assert!(Provider::PRIMARY_PRIORITY
            .iter()
            .all(|p| p.is_primary_capable()));
    }

    #[test]
    fn priority_order_is_deepseek_openai_anthropic() {
        assert_eq!(
            Provider::PRIMARY_PRIORITY,
            [Provider::Deepseek, Provider::Openai, Provider::Anthropic]
        );
    }

    #[test]
    fn serde_uses_lowercase_ids() {
        let json = serde_json::to_string(&Provider::Deepseek).unwrap();
        assert_eq!(json, "\"deepseek\"");
        let back: Provider = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(back, Provider::Anthropic);
    }
}
