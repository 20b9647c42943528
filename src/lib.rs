//! Turn and event core of a tile adventure game.
//!
//! Player input (pointer gestures, keys, auto-paths) is turned into
//! [`actions::Intent`]s, the [`turn_system::TurnManager`] runs the enemy phase
//! with paced delays from the [`animation::AnimationScheduler`], and
//! everything observable is published on the [`event_bus::EventBus`].

pub mod actions;
pub mod animation;
pub mod collaborators;
pub mod combat;
pub mod config;
pub mod event_bus;
pub mod input;
pub mod logging;
pub mod renderer;
pub mod services;
pub mod state;
pub mod turn_system;
pub mod world;
