//! Suppresses repeated "not recognized" announcements for the same stranger.

use crate::types::Embedding;

/// Cosine similarity above which two unknown faces count as the same person.
pub const DEFAULT_SAME_FACE_SIMILARITY: f32 = 0.40;
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug)]
pub struct UnknownFaces {
    seen: Vec<Embedding>,
    same_face_similarity: f32,
    capacity: usize,
}

impl UnknownFaces {
    pub fn new(capacity: usize, same_face_similarity: f32) -> Self {
        Self {
            seen: Vec::new(),
            same_face_similarity,
            capacity,
        }
    }

    /// True if this face has not been announced yet. Only new faces are remembered.
    pub fn should_announce(&mut self, face: &Embedding) -> bool {
        let known = self
            .seen
            .iter()
            .any(|e| e.similarity(face) >= self.same_face_similarity);
        if known {
            return false;
        }
        self.seen.push(face.clone());
        true
    }

    /// Called once per frame; forgets everyone when over capacity.
    pub fn end_frame(&mut self) {
        if self.seen.len() > self.capacity {
            tracing::debug!(count = self.seen.len(), "clearing unknown-face cache");
            self.seen.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for UnknownFaces {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_SAME_FACE_SIMILARITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(i: usize) -> Embedding {
        let mut v = vec![0.0; 16];
        v[i] = 1.0;
        Embedding::new(v)
    }

    #[test]
    fn test_same_face_announced_once() {
        let mut cache = UnknownFaces::default();
        assert!(cache.should_announce(&unit(0)));
        assert!(!cache.should_announce(&Embedding::new({
            let mut v = vec![0.0; 16];
            v[0] = 0.95;
            v[1] = 0.1;
            v
        })));
        assert!(cache.should_announce(&unit(1)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cleared_only_past_capacity() {
        let mut cache = UnknownFaces::new(3, 0.9);
        for i in 0..3 {
            cache.should_announce(&unit(i));
        }
        cache.end_frame();
        assert_eq!(cache.len(), 3);

        cache.should_announce(&unit(3));
        cache.end_frame();
        assert!(cache.is_empty());
        assert!(cache.should_announce(&unit(0)));
    }
}
