//! Closure-backed response transport.

use std::fmt;

use crate::core::{RequestId, ResponseChannel, ResultCode, SchedulerError};

/// Hands every response to a closure.
pub struct FnChannel<F>
where
    F: Fn(RequestId, ResultCode, Vec<u8>) + Send + Sync,
{
    deliver: F,
}

impl<F> FnChannel<F>
where
    F: Fn(RequestId, ResultCode, Vec<u8>) + Send + Sync,
{
    /// Wrap `deliver`.
    pub const fn new(deliver: F) -> Self {
        Self { deliver }
    }
}

impl<F> ResponseChannel for FnChannel<F>
where
    F: Fn(RequestId, ResultCode, Vec<u8>) + Send + Sync,
{
    fn deliver(
        &self,
        request_id: RequestId,
        code: ResultCode,
        payload: Vec<u8>,
    ) -> Result<(), SchedulerError> {
        (self.deliver)(request_id, code, payload);
        Ok(())
    }
}

impl<F> fmt::Debug for FnChannel<F>
where
    F: Fn(RequestId, ResultCode, Vec<u8>) + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnChannel").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_receives_response() {
        let last = Arc::new(AtomicI32::new(-1));
        let seen = Arc::clone(&last);
        let channel = FnChannel::new(move |_, code: ResultCode, _| {
            seen.store(code.raw(), Ordering::SeqCst);
        });
        channel.deliver(1, ResultCode(42), Vec::new()).unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 42);
        assert!(channel.is_alive());
    }
}
