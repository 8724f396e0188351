//! Runner configuration.
//!
//! Built through [`RunnerConfig::builder`], mirroring every surface the
//! pool exposes: endpoint source, timeouts, bundler overrides, remap
//! toggles, connection-reuse policy, and the debugging hotkey.
//!
//! # Example
//!
//! ```ignore
//! let config = RunnerConfig::builder()
//!     .endpoint_url("ws://127.0.0.1:9222/devtools/page/A1B2")
//!     .project_root("/work/plugin")
//!     .external("uxp")
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::bundle::BundleOptions;
use crate::error::{Error, Result};
use crate::identifiers::ContextId;
use crate::worker::WorkerConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default bound for session establishment.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline per RPC call.
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default promise-poll interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Endpoint
// ============================================================================

/// A resolved debugging endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// CDP WebSocket URL.
    pub url: String,

    /// Pinned execution context, when the bootstrapper knows it.
    pub context_id: Option<ContextId>,
}

impl Endpoint {
    /// Creates an endpoint with no pinned context.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            context_id: None,
        }
    }
}

/// Async endpoint resolver: host-specific bootstrapping that turns a
/// proprietary control channel into a raw CDP URL + context id.
pub type EndpointResolver =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Endpoint>> + Send + Sync>;

/// Where the pool gets its endpoint from.
#[derive(Clone)]
pub enum EndpointSource {
    /// A literal WebSocket URL.
    Url(Endpoint),
    /// A resolver invoked at each `start`.
    Resolver(EndpointResolver),
}

impl fmt::Debug for EndpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(endpoint) => f.debug_tuple("Url").field(endpoint).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

// ============================================================================
// RunnerConfig
// ============================================================================

/// Complete pool configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Endpoint source (literal or async resolver).
    pub endpoint: EndpointSource,

    /// Project root for bundling and snapshot I/O.
    pub project_root: PathBuf,

    /// Bound for session establishment.
    pub connect_timeout: Duration,

    /// Deadline per RPC call.
    pub rpc_timeout: Duration,

    /// Promise-poll interval.
    pub poll_interval: Duration,

    /// Log raw RPC payloads at debug level.
    pub debug_payloads: bool,

    /// Bundler overrides (externals, defines, aliases, banner).
    pub bundle: BundleOptions,

    /// Remap stacks/locations through stored sourcemaps.
    pub remap_stacks: bool,

    /// Drop worker-runtime-internal frames from remapped stacks.
    pub filter_internal_frames: bool,

    /// Keep the connection alive across `run_files` batches.
    pub reuse_connection: bool,

    /// Enable the terminal debugging hotkey.
    pub hotkey: bool,

    /// Configuration pushed to the worker after injection.
    pub worker: WorkerConfig,
}

impl RunnerConfig {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::new()
    }
}

// ============================================================================
// RunnerConfigBuilder
// ============================================================================

/// Builder for [`RunnerConfig`].
#[derive(Debug, Default)]
pub struct RunnerConfigBuilder {
    endpoint: Option<EndpointSource>,
    project_root: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    rpc_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    debug_payloads: bool,
    externals: Vec<String>,
    runner_specifiers: Vec<String>,
    defines: Vec<(String, String)>,
    aliases: Vec<(String, String)>,
    banner: Option<String>,
    remap_stacks: Option<bool>,
    filter_internal_frames: Option<bool>,
    reuse_connection: Option<bool>,
    hotkey: bool,
    worker: WorkerConfig,
}

impl RunnerConfigBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a literal endpoint URL.
    #[must_use]
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(EndpointSource::Url(Endpoint::new(url)));
        self
    }

    /// Sets a literal endpoint with a pinned execution context.
    #[must_use]
    pub fn endpoint_with_context(mut self, url: impl Into<String>, context: ContextId) -> Self {
        self.endpoint = Some(EndpointSource::Url(Endpoint {
            url: url.into(),
            context_id: Some(context),
        }));
        self
    }

    /// Sets an async endpoint resolver.
    #[must_use]
    pub fn endpoint_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Endpoint>> + Send + Sync + 'static,
    {
        self.endpoint = Some(EndpointSource::Resolver(Arc::new(resolver)));
        self
    }

    /// Sets the project root.
    #[must_use]
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Sets the session-establishment bound.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the per-call RPC deadline.
    #[must_use]
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    /// Sets the promise-poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Enables raw payload logging.
    #[must_use]
    pub fn debug_payloads(mut self) -> Self {
        self.debug_payloads = true;
        self
    }

    /// Adds an external specifier (kept as a real `require`).
    #[must_use]
    pub fn external(mut self, specifier: impl Into<String>) -> Self {
        self.externals.push(specifier.into());
        self
    }

    /// Adds a test-authoring specifier redirected to the worker global.
    #[must_use]
    pub fn runner_specifier(mut self, specifier: impl Into<String>) -> Self {
        self.runner_specifiers.push(specifier.into());
        self
    }

    /// Adds a whole-word define substitution.
    #[must_use]
    pub fn define(mut self, name: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.defines.push((name.into(), replacement.into()));
        self
    }

    /// Adds a specifier alias.
    #[must_use]
    pub fn alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases.push((from.into(), to.into()));
        self
    }

    /// Sets banner code prepended to every bundle.
    #[must_use]
    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    /// Toggles sourcemap remapping (on by default).
    #[must_use]
    pub fn remap_stacks(mut self, enabled: bool) -> Self {
        self.remap_stacks = Some(enabled);
        self
    }

    /// Toggles worker-frame filtering (on by default).
    #[must_use]
    pub fn filter_internal_frames(mut self, enabled: bool) -> Self {
        self.filter_internal_frames = Some(enabled);
        self
    }

    /// Toggles connection reuse across batches (on by default).
    #[must_use]
    pub fn reuse_connection(mut self, enabled: bool) -> Self {
        self.reuse_connection = Some(enabled);
        self
    }

    /// Enables the terminal debugging hotkey.
    #[must_use]
    pub fn hotkey(mut self) -> Self {
        self.hotkey = true;
        self
    }

    /// Sets the per-test timeout forwarded to the worker.
    #[must_use]
    pub fn test_timeout(mut self, timeout: Duration) -> Self {
        self.worker.test_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Overwrites mismatching snapshots instead of failing.
    #[must_use]
    pub fn update_snapshots(mut self) -> Self {
        self.worker.update_snapshots = true;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no endpoint source was set.
    pub fn build(self) -> Result<RunnerConfig> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::config("no endpoint source configured"))?;

        let project_root = self
            .project_root
            .unwrap_or_else(|| PathBuf::from("."));

        let mut bundle = BundleOptions::new(project_root.clone());
        bundle.externals = self.externals;
        bundle.runner_specifiers.extend(self.runner_specifiers);
        bundle.defines = self.defines.into_iter().collect();
        bundle.aliases = self.aliases.into_iter().collect();
        bundle.banner = self.banner;

        Ok(RunnerConfig {
            endpoint,
            project_root,
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            rpc_timeout: self.rpc_timeout.unwrap_or(DEFAULT_RPC_TIMEOUT),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            debug_payloads: self.debug_payloads,
            bundle,
            remap_stacks: self.remap_stacks.unwrap_or(true),
            filter_internal_frames: self.filter_internal_frames.unwrap_or(true),
            reuse_connection: self.reuse_connection.unwrap_or(true),
            hotkey: self.hotkey,
            worker: self.worker,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
