use crate::record::site_key;
use std::collections::HashMap;

/// Hit counts per site key
#[derive(Debug, Default, Clone)]
pub struct SiteCounter {
    hits: HashMap<String, u64>,
}

impl SiteCounter {
    /// Create an empty counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `path`. Returns `false` if the path has no usable
    /// site key and was ignored.
    pub fn record(&mut self, path: &str) -> bool {
        let Some(site) = site_key(path) else {
            return false;
        };
        match self.hits.get_mut(site) {
            Some(count) => *count += 1,
            None => {
                self.hits.insert(site.to_string(), 1);
            }
        }
        true
    }

    /// Hits recorded for one site
    pub fn hits(&self, site: &str) -> u64 {
        self.hits.get(site).copied().unwrap_or(0)
    }

    /// Number of distinct sites
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether nothing has been counted since creation or the last clear
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Drop every count
    pub fn clear(&mut self) {
        self.hits = HashMap::new();
    }

    /// All sites, most hits first. Equal counts are ordered by site key.
    pub fn ranked(&self) -> Vec<(String, u64)> {
        let mut ranked: Vec<(String, u64)> = self
            .hits
            .iter()
            .map(|(site, &hits)| (site.clone(), hits))
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}
