//! Publication recording for debugging

use crate::error::Result;
use crate::publication::Publication;
use parking_lot::Mutex;

struct Ring {
    publications: Vec<Publication>,
    /// Next slot to overwrite once the buffer is full
    position: usize,
}

/// Records publications into a circular buffer
pub struct PublicationRecorder {
    ring: Mutex<Ring>,

    /// Maximum capacity
    capacity: usize,
}

impl PublicationRecorder {
    /// Create new recorder with given capacity (at least one slot)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                publications: Vec::with_capacity(capacity),
                position: 0,
            }),
            capacity,
        }
    }

    /// Record a publication, overwriting the oldest when full
    pub fn record(&self, publication: Publication) {
        let mut ring = self.ring.lock();
        let pos = ring.position;

        if ring.publications.len() < self.capacity {
            ring.publications.push(publication);
        } else {
            ring.publications[pos] = publication;
        }

        ring.position = (pos + 1) % self.capacity;
    }

    /// All recorded publications, oldest first
    pub fn publications(&self) -> Vec<Publication> {
        let ring = self.ring.lock();
        if ring.publications.len() < self.capacity {
            return ring.publications.clone();
        }

        let (newest, oldest) = ring.publications.split_at(ring.position);
        oldest.iter().chain(newest).cloned().collect()
    }

    /// Publications whose timestamp falls in `[start_ns, end_ns]`, oldest first
    pub fn publications_in_range(&self, start_ns: i64, end_ns: i64) -> Vec<Publication> {
        self.publications()
            .into_iter()
            .filter(|p| p.timestamp_ns >= start_ns && p.timestamp_ns <= end_ns)
            .collect()
    }

    /// Clear all recorded publications
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.publications.clear();
        ring.position = 0;
    }

    pub fn len(&self) -> usize {
        self.ring.lock().publications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().publications.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Export recorded publications as a JSON array
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.publications())?)
    }

    /// Parse publications previously written by [`export_json`](Self::export_json)
    pub fn import_json(json: &str) -> Result<Vec<Publication>> {
        Ok(serde_json::from_str(json)?)
    }
}
