//! # Bulwark CLI
//!
//! Loads a guard policy and drills a call site's guard chain with synthetic
//! concurrent load, reporting how every call ended.
//!
//! ## Purpose
//!
//! Guard limits are easy to get wrong in both directions. A drill answers
//! questions like "with 32 permits and 500 calls per user per hour, what does
//! a burst of 10k calls from 50 users look like?" before the policy ships:
//!
//! - **Check a policy**: every guard is constructed and every binding resolved
//!   up front, so typos and invalid limits fail immediately
//! - **See the ordering**: the report lists the chain in nesting order
//! - **Watch rejections**: calls are split by outcome (succeeded, failed,
//!   rejected by concurrency, rejected by rate, unauthenticated)
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! bulwark --help
//!
//! # Validate a policy and print its bindings
//! bulwark --policy policy.toml --check
//!
//! # 10k calls from 50 principals, each action holding its permit for 5 ms
//! bulwark --policy policy.toml --call-site checkout \
//!     --requests 10000 --workers 64 --principals 50 --hold-ms 5
//!
//! # Machine readable output
//! bulwark --policy policy.toml --call-site checkout --format json
//! ```
//!
//! ## Configuration
//!
//! Configure via CLI arguments or environment variables (CLI takes precedence):
//!
//! ```bash
//! export BULWARK_POLICY=policy.toml
//! export BULWARK_REQUESTS=5000
//! bulwark --call-site search
//!
//! # List all available environment variables
//! bulwark --list-env-vars
//! ```
//!
//! See [`policy`] for the policy file format.

pub mod config;
pub mod drill;
pub mod metrics;
pub mod policy;
