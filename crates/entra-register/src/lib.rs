//! Idempotent registration of an Entra ID application.
//!
//! [`reconcile::Reconciler`] drives a [`directory::Directory`] (the Azure CLI
//! or Microsoft Graph) through find-or-create, redirect URI, application ID
//! URI, permission scope and API permission steps, then reads the tenant id.

pub mod az;
pub mod config;
pub mod directory;
pub mod error;
pub mod graph;
pub mod logging;
pub mod model;
pub mod output;
pub mod reconcile;

pub use config::Settings;
pub use directory::Directory;
pub use error::{ReconcileError, Result};
pub use reconcile::{Outcome, Progress, Reconciler, Report, Step, StepReport, Warning};
