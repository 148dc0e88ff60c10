//! stridesim: data-parallel surface locomotion for capsule agents.
//!
//! Advances batches of capsule-shaped agents across static and dynamic
//! collision geometry: floor scanning, ramp following, step-up, ledge
//! handling, falling with air control, landing, and penetration recovery,
//! all through synchronous swept-shape queries against a frozen collision
//! world.

pub mod config;
pub mod sim;
