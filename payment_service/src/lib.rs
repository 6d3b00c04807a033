//! Payment Service Library
//!
//! This library acts as the core of the Payment Service, exporting the
//! necessary modules for the application binary and integration tests.
//!
//! # Modules
//!
//! * `api` - Contains the HTTP interface (routes, DTOs, error mapping).
//! * `config` - Environment-driven settings.
//! * `domain` - Contains the domain entities, ports and business rules.
//! * `infrastructure` - Concrete implementations of repositories and gateways.
//! * `jobs` - Background payment workers.
//! * `metrics` - Process-wide counter registry.
//! * `use_cases` - Application business logic and workflows.

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod jobs;
pub mod metrics;
pub mod use_cases;
