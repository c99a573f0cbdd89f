//! Per-call configuration.

use std::sync::Arc;
use std::time::Duration;

use pbweb_runtime::{DecodeOptions, EncodeOptions};
use tokio::time::Instant;

use crate::cancel::CancelSignal;
use crate::interceptor::Interceptor;
use crate::metadata::Metadata;

/// A call timeout, either relative or absolute.
///
/// Rendering a non-positive timeout for the wire is a synchronous
/// `DEADLINE_EXCEEDED` failure; the transport checks this before building
/// request headers.
#[derive(Clone, Copy, Debug)]
pub enum Timeout {
    /// Fail the call this long after it starts.
    Duration(Duration),
    /// Fail the call at this point in time.
    Deadline(Instant),
}

impl Timeout {
    /// Time left until the timeout fires. `None` when a deadline already
    /// passed; note that a `Duration` of zero is returned as-is, because
    /// the two produce different error messages.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Timeout::Duration(d) => Some(*d),
            Timeout::Deadline(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() { None } else { Some(left) }
            }
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::Duration(d)
    }
}

impl From<Instant> for Timeout {
    fn from(at: Instant) -> Self {
        Timeout::Deadline(at)
    }
}

/// Options applied to a single call.
///
/// Transports and clients hold default options; per-call overrides are
/// folded over them with [`CallOptions::merge`].
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Cancel the call when it takes longer than this.
    pub timeout: Option<Timeout>,
    /// Metadata sent as request headers.
    pub meta: Metadata,
    /// Cooperative cancellation signal observed by the transport.
    pub cancel: Option<CancelSignal>,
    /// Interceptors wrapping the transport invocation, first is outermost.
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    /// Binary read options for response messages.
    pub decode: Option<DecodeOptions>,
    /// Binary write options for request messages.
    pub encode: Option<EncodeOptions>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_decode(mut self, decode: DecodeOptions) -> Self {
        self.decode = Some(decode);
        self
    }

    pub fn with_encode(mut self, encode: EncodeOptions) -> Self {
        self.encode = Some(encode);
        self
    }

    /// Binary read options, falling back to the defaults.
    pub fn decode_options(&self) -> DecodeOptions {
        self.decode.unwrap_or_default()
    }

    /// Binary write options, falling back to the defaults.
    pub fn encode_options(&self) -> EncodeOptions {
        self.encode.unwrap_or_default()
    }

    /// Fold `overrides` over `base`.
    ///
    /// Scalar knobs are replaced when set in `overrides`; metadata merges
    /// per key with the override winning; interceptor lists concatenate,
    /// base-registered first (and therefore outermost).
    pub fn merge(mut base: CallOptions, overrides: CallOptions) -> CallOptions {
        if overrides.timeout.is_some() {
            base.timeout = overrides.timeout;
        }
        if overrides.cancel.is_some() {
            base.cancel = overrides.cancel;
        }
        if overrides.decode.is_some() {
            base.decode = overrides.decode;
        }
        if overrides.encode.is_some() {
            base.encode = overrides.encode;
        }
        base.meta.merge(&overrides.meta);
        base.interceptors.extend(overrides.interceptors);
        base
    }
}

impl std::fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("timeout", &self.timeout)
            .field("meta", &self.meta)
            .field("cancel", &self.cancel.is_some())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
