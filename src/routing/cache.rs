use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

use super::{RouteResult, RoutingAlgorithm};
use crate::error::{GridError, GridResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub source: String,
    pub destination: String,
    pub algorithm: RoutingAlgorithm,
}

impl RouteKey {
    pub fn new(source: &str, destination: &str, algorithm: RoutingAlgorithm) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            algorithm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
}

/// LRU of route results tagged with the graph generation they were computed at
///
/// Any generation change empties the whole cache before the next lookup or
/// insert, so a result never outlives the topology it was computed on.
pub struct RouteCache {
    entries: LruCache<RouteKey, RouteResult>,
    generation: u64,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl RouteCache {
    pub fn new(capacity: usize) -> GridResult<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| GridError::validation("route_cache", "capacity must be >= 1"))?;
        Ok(Self {
            entries: LruCache::new(capacity),
            generation: 0,
            hits: 0,
            misses: 0,
            invalidations: 0,
        })
    }

    fn sync(&mut self, generation: u64) {
        if generation != self.generation {
            if !self.entries.is_empty() {
                self.entries.clear();
                self.invalidations += 1;
            }
            self.generation = generation;
        }
    }

    pub fn get(&mut self, key: &RouteKey, generation: u64) -> Option<RouteResult> {
        self.sync(generation);
        match self.entries.get(key) {
            Some(hit) => {
                self.hits += 1;
                Some(hit.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: RouteKey, generation: u64, result: RouteResult) {
        self.sync(generation);
        self.entries.put(key, result);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            size: self.entries.len(),
            capacity: self.entries.cap().get(),
            hits: self.hits,
            misses: self.misses,
            invalidations: self.invalidations,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}
