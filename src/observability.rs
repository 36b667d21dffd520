//! Shared tracing targets for provisioning instrumentation.
//!
//! Each stage logs under its own target so subscribers can filter, for
//! example, command invocations without the cache chatter.

/// Target used by the top-level provisioning span and its summary events.
pub(crate) const LOG_TARGET: &str = "dgraph_test::provision";

/// Target used by cache lookups, population, and copies.
pub(crate) const CACHE_LOG_TARGET: &str = "dgraph_test::cache";

/// Target used by source checkout synchronisation.
pub(crate) const REPO_LOG_TARGET: &str = "dgraph_test::repo";

/// Target used by external command invocations.
pub(crate) const COMMAND_LOG_TARGET: &str = "dgraph_test::command";
