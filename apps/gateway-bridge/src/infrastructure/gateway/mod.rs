//! Gateway Session Adapters
//!
//! The vendor session is an external collaborator reached through
//! [`GatewaySession`](crate::application::ports::GatewaySession). This crate
//! ships an in-process simulation of it.

mod simulated;

pub use simulated::{GatewayCommand, SimulatedGateway, SimulatedGatewayFactory};
