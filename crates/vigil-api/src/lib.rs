//! JSON REST API for Vigil.
//!
//! Exposes an axum [`Router`] over a [`Switch`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vigil_api::api_router(switch.clone()))
//! ```

pub mod audit;
pub mod deliveries;
pub mod error;
pub mod subjects;

use axum::{
  Router,
  routing::{get, post, put},
};
use vigil_core::{clock::Clock, notify::Notifier, store::SwitchStore};
use vigil_engine::Switch;

pub use error::ApiError;

/// Build a fully-materialised API router for `switch`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, N, C>(switch: Switch<S, N, C>) -> Router<()>
where
  S: SwitchStore + 'static,
  N: Notifier + 'static,
  C: Clock + 'static,
{
  Router::new()
    // Subjects
    .route(
      "/subjects",
      get(subjects::list::<S, N, C>).post(subjects::create::<S, N, C>),
    )
    .route("/subjects/{id}", get(subjects::get_one::<S, N, C>))
    .route("/subjects/{id}/heartbeat", post(subjects::heartbeat::<S, N, C>))
    .route("/subjects/{id}/settings", put(subjects::settings::<S, N, C>))
    // Deliveries
    .route("/subjects/{id}/deliveries", get(deliveries::list::<S, N, C>))
    .route("/deliveries/{id}/retry", post(deliveries::retry::<S, N, C>))
    // Audit
    .route("/subjects/{id}/audit", get(audit::list::<S, N, C>))
    .with_state(switch)
}
