use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate footprint of the store, computed on demand by a full scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub entry_count: u64,
    pub total_size_bytes: u64,
    pub per_domain: BTreeMap<String, DomainUsage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainUsage {
    pub size: u64,
    pub count: u64,
}

impl StorageUsage {
    pub(crate) fn add(&mut self, domain: &str, size: u64) {
        self.entry_count += 1;
        self.total_size_bytes += size;
        let entry = self.per_domain.entry(domain.to_string()).or_default();
        entry.size += size;
        entry.count += 1;
    }

    /// Domains ordered by descending entry count
    pub fn busiest_domains(&self) -> Vec<(&str, DomainUsage)> {
        let mut domains: Vec<_> = self
            .per_domain
            .iter()
            .map(|(domain, usage)| (domain.as_str(), *usage))
            .collect();
        domains.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
        domains
    }
}
