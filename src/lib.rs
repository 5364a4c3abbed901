//! Kanban task-board state with optimistic synchronisation.
//!
//! Projects own tasks laid out in four fixed columns. Local state (the
//! [`collection::TaskCollection`] and [`project::ProjectRegistry`]) is changed
//! first and the [`persistence`] store is told afterwards: the
//! [`coordinator::Coordinator`] applies each task mutation optimistically,
//! sends it through the [`gateway::SyncGateway`] and reconciles or rolls back
//! when the store answers. A [`session::Session`] wires everything together
//! for one logged-in user.

pub mod api;
pub mod autosave;
pub mod board;
pub mod collection;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod fields;
pub mod gateway;
pub mod identity;
pub mod persistence;
pub mod project;
pub mod reducer;
pub mod session;
pub mod task;
pub mod timestamp;
