//! The single in-memory copy of the sanitized document.
//!
//! Readers take a snapshot (an `Arc` clone under a read lock) and never see a
//! half-installed document; the writer builds the new [`Document`] before
//! taking the write lock, so the exclusive section is one pointer swap.
//!
//! There is no empty state: a cache is created from the first successful
//! load, which is why [`DocumentCache::new`] takes content.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;

/// A sanitized document together with its freshness metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Sanitized text, always valid UTF-8.
    pub content: Bytes,
    /// When the refresh that produced `content` completed.
    pub captured_at: DateTime<Utc>,
    /// `content.len()`, computed once.
    pub byte_length: usize,
}

impl Document {
    /// Wrap freshly sanitized content, stamping it with the current time.
    pub fn new(content: String) -> Self {
        Self::with_capture_time(content, Utc::now())
    }

    /// Wrap content with an explicit capture time.
    pub fn with_capture_time(content: String, captured_at: DateTime<Utc>) -> Self {
        let byte_length = content.len();
        Self {
            content: Bytes::from(content),
            captured_at,
            byte_length,
        }
    }

    /// Capture time as RFC 3339 UTC with second precision, e.g. `2024-05-01T12:00:00Z`.
    pub fn source_date(&self) -> String {
        self.captured_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Age of the document relative to `now`, clamped at zero.
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.captured_at).num_seconds().max(0) as u64
    }
}

/// Shared handle to the current document.
///
/// Cloning the handle is cheap; all clones see the same document.
#[derive(Debug, Clone)]
pub struct DocumentCache {
    current: Arc<RwLock<Arc<Document>>>,
}

impl DocumentCache {
    /// Create a cache holding its first document.
    pub fn new(content: String) -> Self {
        Self::from_document(Document::new(content))
    }

    /// Create a cache from an already-built document.
    pub fn from_document(document: Document) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(document))),
        }
    }

    /// Replace the whole document and return the installed snapshot.
    pub fn replace(&self, content: String) -> Arc<Document> {
        self.install(Document::new(content))
    }

    /// Install a prebuilt document as the current one.
    pub fn install(&self, document: Document) -> Arc<Document> {
        let document = Arc::new(document);
        *self.current.write() = Arc::clone(&document);
        document
    }

    /// The current document as of this call.
    ///
    /// The returned snapshot is unaffected by later replacements.
    pub fn snapshot(&self) -> Arc<Document> {
        Arc::clone(&self.current.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_document_metadata() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let doc = Document::with_capture_time("a,b\nc\n".to_string(), at);
        assert_eq!(doc.byte_length, 6);
        assert_eq!(&doc.content[..], b"a,b\nc\n");
        assert_eq!(doc.source_date(), "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_document_age() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let doc = Document::with_capture_time("x\n".to_string(), at);
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 10, 0).unwrap();
        assert_eq!(doc.age_secs(later), 600);
        // Clock skew never yields a negative age.
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        assert_eq!(doc.age_secs(earlier), 0);
    }

    #[test]
    fn test_snapshot_after_replace_returns_new_triple() {
        let cache = DocumentCache::new("first\n".to_string());
        let installed = cache.replace("second line\n".to_string());

        let snap = cache.snapshot();
        assert_eq!(*snap, *installed);
        assert_eq!(&snap.content[..], b"second line\n");
        assert_eq!(snap.byte_length, "second line\n".len());
    }

    #[test]
    fn test_snapshot_outlives_replace() {
        let cache = DocumentCache::new("old\n".to_string());
        let before = cache.snapshot();
        cache.replace("new\n".to_string());

        assert_eq!(&before.content[..], b"old\n");
        assert_eq!(&cache.snapshot().content[..], b"new\n");
    }

    #[test]
    fn test_clones_share_state() {
        let cache = DocumentCache::new("a\n".to_string());
        let other = cache.clone();
        other.replace("b\n".to_string());
        assert_eq!(&cache.snapshot().content[..], b"b\n");
    }

    #[test]
    fn test_concurrent_snapshots_while_replacing() {
        // Each document's length encodes which write produced it, so a torn
        // read would show up as a length/content mismatch.
        let cache = DocumentCache::new("0".to_string());
        let readers = 8;
        let barrier = Arc::new(Barrier::new(readers + 1));

        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let cache = cache.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..2_000 {
                        let snap = cache.snapshot();
                        assert_eq!(snap.byte_length, snap.content.len());
                        assert!(snap.content.iter().all(|&b| b == snap.content[0]));
                    }
                })
            })
            .collect();

        barrier.wait();
        for i in 1..500u32 {
            let digit = char::from(b'0' + (i % 10) as u8);
            cache.replace(digit.to_string().repeat(i as usize));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_readers_do_not_block_each_other() {
        let cache = DocumentCache::new("shared\n".to_string());
        let guard = cache.current.read();
        // A second reader proceeds while the first read guard is held.
        let snap = cache.snapshot();
        drop(guard);
        assert_eq!(&snap.content[..], b"shared\n");
    }
}
