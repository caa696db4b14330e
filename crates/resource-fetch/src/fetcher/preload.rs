use serde::Serialize;

/// Which preloads `clear_preloads` drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearPreloadsPolicy {
    /// Every outstanding preload.
    #[default]
    ClearAllPreloads,
    /// Keep `<link rel=preload>` style preloads, drop speculative ones.
    ClearSpeculativeMarkupPreloads,
}

/// How preloads were used. Instrumentation only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadStats {
    /// Preloads issued.
    pub total: u64,
    /// Claimed by a real request before the load finished.
    pub referenced_before_completion: u64,
    /// Claimed by a real request after the load finished.
    pub referenced_after_completion: u64,
    /// Cleared or still outstanding without ever being claimed.
    pub never_referenced: u64,
    /// Real requests that found no preload to reuse for a preloaded URL.
    pub misses: u64,
}

impl PreloadStats {
    pub(crate) fn record_claim(&mut self, loaded: bool) {
        if loaded {
            self.referenced_after_completion += 1;
        } else {
            self.referenced_before_completion += 1;
        }
    }

    pub fn referenced(&self) -> u64 {
        self.referenced_before_completion + self.referenced_after_completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_split_by_completion() {
        let mut stats = PreloadStats::default();
        stats.record_claim(false);
        stats.record_claim(true);
        stats.record_claim(true);
        assert_eq!(stats.referenced_before_completion, 1);
        assert_eq!(stats.referenced_after_completion, 2);
        assert_eq!(stats.referenced(), 3);
    }
}
