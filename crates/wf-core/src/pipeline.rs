//! Request lifecycle tracking
//!
//! Interception happens in two phases: a request is seen (and decided)
//! before headers go out, and its outcome is consumed later when the
//! response arrives or the request errors out. The pipeline correlates the
//! two phases by request id over a bounded buffer, so an abandoned request
//! costs a slot, never a leak.

use crate::correlation::CorrelationBuffer;
use crate::types::{Decision, ResourceType};

/// Default number of in-flight requests tracked.
pub const DEFAULT_CAPACITY: usize = 256;

/// State recorded for one intercepted request.
#[derive(Debug, Clone, Default)]
pub struct PendingRequest {
    pub request_url: String,
    pub document_url: String,
    pub resource_type: ResourceType,
    /// Decision made at interception time, when one was made.
    pub decision: Option<Decision>,
}

/// Bounded store of in-flight requests keyed by request id.
pub struct RequestPipeline {
    store: CorrelationBuffer<PendingRequest>,
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RequestPipeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: CorrelationBuffer::new(capacity),
        }
    }

    /// Record a newly intercepted request and return its entry for filling.
    pub fn begin(
        &mut self,
        request_id: &str,
        url: &str,
        document_url: &str,
        resource_type: ResourceType,
    ) -> &mut PendingRequest {
        let entry = self.store.push(request_id);
        entry.request_url = url.to_string();
        entry.document_url = document_url.to_string();
        entry.resource_type = resource_type;
        entry
    }

    /// Consume the most recent entry for a request id. `None` means the
    /// entry was evicted or the id was never seen; callers treat that as
    /// "no recorded decision".
    pub fn take(&mut self, request_id: &str) -> Option<PendingRequest> {
        self.store.pop(request_id)
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
