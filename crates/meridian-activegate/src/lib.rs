//! Gateway StatefulSets for Meridian AgentFleets
//!
//! Builds the desired StatefulSet for each capability descriptor and
//! converges the cluster towards it:
//! - `DesiredStateBuilder` renders the StatefulSet and its template hash
//! - `StatefulSetReconciler` picks create, delete, update or nothing
//! - `controller` wires both into a kube-runtime reconcile loop

pub mod builder;
pub mod controller;
pub mod custom_properties;
pub mod error;
pub mod reconciler;
pub mod store;

pub use builder::{DesiredStateBuilder, Mutator, ResourceMeta};
pub use controller::{error_policy, reconcile, Context};
pub use error::{ActiveGateError, BuildError};
pub use reconciler::{ReconcileOutcome, StatefulSetReconciler};
