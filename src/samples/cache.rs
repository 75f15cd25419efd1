// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{decode_async, DecodeError, SampleBuffer};

/// A cached sample and the name it was registered under.
#[derive(Debug, Clone)]
pub struct CachedSample {
    display_name: String,
    buffer: Arc<SampleBuffer>,
}

impl CachedSample {
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn buffer(&self) -> Arc<SampleBuffer> {
        self.buffer.clone()
    }
}

/// Decoded samples keyed by ID. Holding an `Arc` from the cache keeps a buffer
/// alive even if its entry is replaced or removed.
#[derive(Default)]
pub struct SampleCache {
    samples: RwLock<HashMap<String, CachedSample>>,
}

impl SampleCache {
    pub fn new() -> SampleCache {
        SampleCache::default()
    }

    /// Looks up a buffer by ID.
    pub fn get(&self, id: &str) -> Option<Arc<SampleBuffer>> {
        self.samples.read().get(id).map(CachedSample::buffer)
    }

    /// Looks up a buffer and its display name by ID.
    pub fn entry(&self, id: &str) -> Option<CachedSample> {
        self.samples.read().get(id).cloned()
    }

    /// Inserts a buffer, replacing anything already stored under the ID.
    /// Returns the replaced buffer.
    pub fn put(
        &self,
        id: &str,
        display_name: &str,
        buffer: Arc<SampleBuffer>,
    ) -> Option<Arc<SampleBuffer>> {
        let replaced = self.samples.write().insert(
            id.to_string(),
            CachedSample {
                display_name: display_name.to_string(),
                buffer,
            },
        );
        if replaced.is_some() {
            debug!(id, "Replaced cached sample");
        }
        replaced.map(|sample| sample.buffer)
    }

    /// Evicts a sample. Voices already playing it are unaffected.
    pub fn remove(&self, id: &str) -> Option<Arc<SampleBuffer>> {
        self.samples.write().remove(id).map(|sample| sample.buffer)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.samples.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// IDs of all cached samples, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.samples.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn display_name(&self, id: &str) -> Option<String> {
        self.samples
            .read()
            .get(id)
            .map(|sample| sample.display_name.clone())
    }

    /// Returns the total memory used by cached samples.
    pub fn memory_usage(&self) -> usize {
        self.samples
            .read()
            .values()
            .map(|sample| sample.buffer.memory_size())
            .sum()
    }

    /// Decodes `bytes` and stores the result under `id`. A failed decode
    /// leaves the cache untouched.
    pub async fn load(
        &self,
        id: &str,
        display_name: &str,
        bytes: Vec<u8>,
        extension: Option<&str>,
        base_pitch: Option<u8>,
    ) -> Result<Arc<SampleBuffer>, DecodeError> {
        info!(id, display_name, bytes = bytes.len(), "Loading sample");
        let buffer = match decode_async(bytes, extension.map(str::to_string)).await {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(id, display_name, err = %e, "Failed to decode sample");
                return Err(e);
            }
        };
        let buffer = Arc::new(match base_pitch {
            Some(pitch) => buffer.with_base_pitch(pitch),
            None => buffer,
        });

        info!(
            id,
            channels = buffer.channel_count(),
            sample_rate = buffer.sample_rate(),
            duration_ms = buffer.duration().as_millis(),
            memory_kb = buffer.memory_size() / 1024,
            "Sample loaded"
        );
        self.put(id, display_name, buffer.clone());
        Ok(buffer)
    }
}

impl std::fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleCache")
            .field("cached_samples", &self.len())
            .field("total_memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::wav_bytes;

    fn buffer(value: f32) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![vec![value; 100]], 44100).unwrap())
    }

    #[test]
    fn test_put_and_get() {
        let cache = SampleCache::new();
        assert!(cache.is_empty());
        assert!(cache.get("kick").is_none());

        cache.put("kick", "Kick Drum", buffer(0.5));
        assert!(cache.contains("kick"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.display_name("kick").as_deref(), Some("Kick Drum"));
        assert_eq!(cache.get("kick").unwrap().value_at(0, 0.0), 0.5);
        assert_eq!(cache.memory_usage(), 400);
    }

    #[test]
    fn test_put_overwrites_and_keeps_old_alive() {
        let cache = SampleCache::new();
        cache.put("snare", "Snare", buffer(0.25));
        let held = cache.get("snare").unwrap();

        let replaced = cache.put("snare", "Snare 2", buffer(0.75));
        assert!(replaced.is_some());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.display_name("snare").as_deref(), Some("Snare 2"));
        assert_eq!(cache.get("snare").unwrap().value_at(0, 0.0), 0.75);

        // A holder of the old buffer still sees the old data.
        assert_eq!(held.value_at(0, 0.0), 0.25);
    }

    #[test]
    fn test_remove() {
        let cache = SampleCache::new();
        cache.put("a", "A", buffer(0.1));
        cache.put("b", "B", buffer(0.2));
        assert_eq!(cache.ids(), vec!["a".to_string(), "b".to_string()]);

        assert!(cache.remove("a").is_some());
        assert!(cache.remove("a").is_none());
        assert_eq!(cache.ids(), vec!["b".to_string()]);
        let entry = cache.entry("b").unwrap();
        assert_eq!(entry.display_name(), "B");
    }

    #[tokio::test]
    async fn test_load() {
        let cache = SampleCache::new();
        let bytes = wav_bytes(1, 44100, &[16384; 441]);

        let loaded = cache
            .load("hat", "Hi-Hat", bytes, Some("wav"), Some(72))
            .await
            .unwrap();
        assert_eq!(loaded.frames(), 441);
        assert_eq!(loaded.base_pitch(), Some(72));
        assert!(Arc::ptr_eq(&loaded, &cache.get("hat").unwrap()));
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache = SampleCache::new();
        cache.put("hat", "Hi-Hat", buffer(0.5));

        let result = cache
            .load("hat", "Broken", b"garbage".to_vec(), None, None)
            .await;
        assert!(result.is_err());
        assert_eq!(cache.display_name("hat").as_deref(), Some("Hi-Hat"));

        let result = cache
            .load("tom", "Tom", b"garbage".to_vec(), None, None)
            .await;
        assert!(result.is_err());
        assert!(!cache.contains("tom"));
    }
}
