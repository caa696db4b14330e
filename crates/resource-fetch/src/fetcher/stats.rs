use serde::Serialize;

use super::RevalidationPolicy;

/// Counters of how requests were served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub requests: u64,
    pub loads: u64,
    pub reloads: u64,
    pub revalidations: u64,
    pub uses: u64,
    /// Requests served from a cached resource nobody was observing.
    pub dead_resource_uses: u64,
    /// Requests answered from `data:` URLs without a load.
    pub static_data: u64,
    /// Requests refused before a resource was handed out.
    pub refused: u64,
}

impl FetchStats {
    pub(crate) fn record(&mut self, policy: RevalidationPolicy, was_dead: bool) {
        match policy {
            RevalidationPolicy::Load => self.loads += 1,
            RevalidationPolicy::Reload => self.reloads += 1,
            RevalidationPolicy::Revalidate => self.revalidations += 1,
            RevalidationPolicy::Use => {
                self.uses += 1;
                if was_dead {
                    self.dead_resource_uses += 1;
                }
            }
        }
    }

    /// Share of requests that did not go to the network.
    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        (self.uses + self.static_data) as f64 / self.requests as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_ratio() {
        let mut stats = FetchStats {
            requests: 4,
            ..Default::default()
        };
        stats.record(RevalidationPolicy::Load, false);
        stats.record(RevalidationPolicy::Use, true);
        stats.record(RevalidationPolicy::Use, false);
        stats.record(RevalidationPolicy::Revalidate, true);

        assert_eq!(stats.loads, 1);
        assert_eq!(stats.uses, 2);
        assert_eq!(stats.dead_resource_uses, 1);
        assert_eq!(stats.revalidations, 1);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
