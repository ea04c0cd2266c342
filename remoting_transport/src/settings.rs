// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Settings of the transport providers
//!
//! Every option is optional. An unset or non-positive value falls back to its documented default
//! through the matching `effective_*` accessor.

use remoting::concurrency::Duration;

/// The default maximum size of an encoded frame, 4 MiB
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
/// The default timeout of a single TCP connect
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// The default timeout of establishing a channel
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
/// The default timeout of closing a channel
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// The default idle interval between heartbeats of a streaming connection
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// The default number of calls in flight on a single streaming connection
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 1024;

fn positive_duration(value: Option<Duration>) -> Option<Duration> {
    value.filter(|dur| !dur.is_zero())
}

fn positive_size(value: Option<usize>) -> Option<usize> {
    value.filter(|size| *size > 0)
}

/// Settings of the binding provider, which opens a connection per call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTransportSettings {
    /// The maximum size of an encoded frame
    pub max_message_size: Option<usize>,
    /// The maximum time to wait on a response. Unbounded when unset
    pub operation_timeout: Option<Duration>,
    /// The idle interval between heartbeats while waiting on a response. Disabled when unset
    pub keep_alive_interval: Option<Duration>,
    /// The timeout of a single TCP connect
    pub connect_timeout: Option<Duration>,
    /// The timeout of establishing the call's connection
    pub open_timeout: Option<Duration>,
    /// The timeout of closing the call's connection
    pub close_timeout: Option<Duration>,
}

impl BindingTransportSettings {
    /// Set the maximum frame size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Set the response timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Set the heartbeat interval
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Set the TCP connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the open timeout
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = Some(timeout);
        self
    }

    /// Set the close timeout
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// The maximum frame size, 4 MiB by default
    pub fn effective_max_message_size(&self) -> usize {
        positive_size(self.max_message_size).unwrap_or(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// The response timeout, [None] meaning unbounded
    pub fn effective_operation_timeout(&self) -> Option<Duration> {
        positive_duration(self.operation_timeout)
    }

    /// The heartbeat interval, [None] meaning no heartbeats
    pub fn effective_keep_alive_interval(&self) -> Option<Duration> {
        positive_duration(self.keep_alive_interval)
    }

    /// The TCP connect timeout, 5 seconds by default
    pub fn effective_connect_timeout(&self) -> Duration {
        positive_duration(self.connect_timeout).unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// The open timeout, 5 seconds by default
    pub fn effective_open_timeout(&self) -> Duration {
        positive_duration(self.open_timeout).unwrap_or(DEFAULT_OPEN_TIMEOUT)
    }

    /// The close timeout, 5 seconds by default
    pub fn effective_close_timeout(&self) -> Duration {
        positive_duration(self.close_timeout).unwrap_or(DEFAULT_CLOSE_TIMEOUT)
    }
}

/// Settings of the streaming provider, which multiplexes calls over one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamTransportSettings {
    /// The maximum size of an encoded frame
    pub max_message_size: Option<usize>,
    /// The maximum time to wait on a response. Unbounded when unset
    pub operation_timeout: Option<Duration>,
    /// The idle interval between heartbeats
    pub keep_alive_interval: Option<Duration>,
    /// The timeout of a single TCP connect
    pub connect_timeout: Option<Duration>,
    /// The timeout of establishing the channel, handshake included
    pub open_timeout: Option<Duration>,
    /// The timeout of closing the channel
    pub close_timeout: Option<Duration>,
    /// The maximum number of calls in flight on the connection
    pub max_concurrent_calls: Option<usize>,
}

impl StreamTransportSettings {
    /// Set the maximum frame size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Set the response timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Set the heartbeat interval
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Set the TCP connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the open timeout
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = Some(timeout);
        self
    }

    /// Set the close timeout
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// Set the in-flight call limit
    pub fn with_max_concurrent_calls(mut self, calls: usize) -> Self {
        self.max_concurrent_calls = Some(calls);
        self
    }

    /// The maximum frame size, 4 MiB by default
    pub fn effective_max_message_size(&self) -> usize {
        positive_size(self.max_message_size).unwrap_or(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// The response timeout, [None] meaning unbounded
    pub fn effective_operation_timeout(&self) -> Option<Duration> {
        positive_duration(self.operation_timeout)
    }

    /// The heartbeat interval, 30 seconds by default
    pub fn effective_keep_alive_interval(&self) -> Duration {
        positive_duration(self.keep_alive_interval).unwrap_or(DEFAULT_KEEP_ALIVE_INTERVAL)
    }

    /// The TCP connect timeout, 5 seconds by default
    pub fn effective_connect_timeout(&self) -> Duration {
        positive_duration(self.connect_timeout).unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// The open timeout, 5 seconds by default
    pub fn effective_open_timeout(&self) -> Duration {
        positive_duration(self.open_timeout).unwrap_or(DEFAULT_OPEN_TIMEOUT)
    }

    /// The close timeout, 5 seconds by default
    pub fn effective_close_timeout(&self) -> Duration {
        positive_duration(self.close_timeout).unwrap_or(DEFAULT_CLOSE_TIMEOUT)
    }

    /// The in-flight call limit, 1024 by default
    pub fn effective_max_concurrent_calls(&self) -> usize {
        positive_size(self.max_concurrent_calls).unwrap_or(DEFAULT_MAX_CONCURRENT_CALLS)
    }
}
