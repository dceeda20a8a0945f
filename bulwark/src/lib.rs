//! # Bulwark
//!
//! Composable guards that protect a service's call path from overload and
//! cascading failure.
//!
//! ## Overview
//!
//! A [`Guard`] wraps a protected action and decides whether it may run. Guards
//! are long-lived, shared objects; one instance serves many concurrent callers.
//! Bulwark ships two of them:
//!
//! - **[`ConcurrencyThrottle`]**: bounds the number of in-flight actions and
//!   rejects (never queues) anything beyond the limit
//! - **[`RateLimitingThrottle`]**: bounds the number of actions per identity
//!   within a recurring hourly window
//!
//! Guards are composed with a [`GuardChain`]. The first guard in the chain wraps
//! every guard after it, so the declared order decides which guard gets to
//! reject a call first.
//!
//! ## Quick Start
//!
//! ```
//! use bulwark::{ConcurrencyThrottle, ExecuteError, GuardChain, GuardError};
//!
//! # tokio_test::block_on(async {
//! let chain = GuardChain::builder()
//!     .guard(ConcurrencyThrottle::new("db", 10)?)
//!     .build();
//!
//! let rows = chain
//!     .execute(|| async { Ok::<_, std::io::Error>(vec![1, 2, 3]) })
//!     .await;
//!
//! match rows {
//!     Ok(rows) => println!("fetched {} rows", rows.len()),
//!     Err(ExecuteError::Rejected(e)) => println!("rejected: {e}"),
//!     Err(ExecuteError::Action(e)) => println!("query failed: {e}"),
//! }
//! # Ok::<(), GuardError>(())
//! # }).unwrap();
//! ```
//!
//! ## Rate Limiting by Identity
//!
//! The rate limiter asks an [`IdentityResolver`] who is calling. The resolver is
//! handed to the guard at construction; [`TaskLocalPrincipal`] reads a principal
//! scoped to the current task with [`with_principal`].
//!
//! ```
//! use bulwark::{GuardExt, Principal, RateLimitingThrottle, TaskLocalPrincipal, with_principal};
//!
//! # tokio_test::block_on(async {
//! let limiter = RateLimitingThrottle::new("api", 1000, TaskLocalPrincipal)?;
//!
//! let result = with_principal(
//!     Principal::authenticated("alice"),
//!     limiter.call(|| async { Ok::<_, std::io::Error>("hello") }),
//! )
//! .await;
//! assert!(result.is_ok());
//! # Ok::<(), bulwark::GuardError>(())
//! # }).unwrap();
//! ```
//!
//! ## Resolving Guards per Call Site
//!
//! A [`GuardListSource`] hands out the ordered chain for a call site.
//! [`GuardRegistry`] keeps guards by name and binds call sites to ordered lists
//! of guard names:
//!
//! ```
//! use bulwark::{ConcurrencyThrottle, GuardListSource, GuardRegistry};
//!
//! let mut registry = GuardRegistry::new();
//! registry.register(ConcurrencyThrottle::new("db", 8)?)?;
//! registry.bind("checkout", ["db"])?;
//!
//! let chain = registry.guards("checkout");
//! assert_eq!(chain.names(), vec!["db"]);
//! # Ok::<(), bulwark::GuardError>(())
//! ```
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for the per-identity counters
//! - `serde`: Serializable [`GuardSnapshot`]s for reporting

pub mod core;

pub use core::{
    Action, Clock, ConcurrencyThrottle, ExecuteError, FnResolver, Guard, GuardChain,
    GuardChainBuilder, GuardError, GuardExt, GuardKind, GuardListSource, GuardRegistry,
    GuardSnapshot, GuardState, IdentityResolver, Managed, Principal, RateLimitingThrottle,
    StaticGuardListSource, SystemClock, TaskLocalPrincipal, with_principal,
};
