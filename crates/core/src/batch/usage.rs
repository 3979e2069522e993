use serde::{Deserialize, Serialize};

/// Token and cost accounting reported by the agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
    /// Context window of the model, when known
    #[serde(default)]
    pub context_window: u64,
}

impl UsageStats {
    /// Fold another report into this one
    pub fn accumulate(&mut self, other: &UsageStats) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.total_cost_usd += other.total_cost_usd;
        self.context_window = self.context_window.max(other.context_window);
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_read_input_tokens
            + self.cache_creation_input_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens() == 0 && self.total_cost_usd == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate() {
        let mut total = UsageStats::default();
        assert!(total.is_empty());

        total.accumulate(&UsageStats {
            input_tokens: 100,
            output_tokens: 20,
            total_cost_usd: 0.5,
            context_window: 200_000,
            ..Default::default()
        });
        total.accumulate(&UsageStats {
            input_tokens: 50,
            cache_read_input_tokens: 10,
            total_cost_usd: 0.25,
            ..Default::default()
        });

        assert_eq!(total.input_tokens, 150);
        assert_eq!(total.total_tokens(), 180);
        assert!((total.total_cost_usd - 0.75).abs() < f64::EPSILON);
        assert_eq!(total.context_window, 200_000);
    }
}
