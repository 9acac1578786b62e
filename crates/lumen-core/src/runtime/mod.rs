// SPDX-License-Identifier: Apache-2.0
//! The per-program mutable runtime: value storage, state persistence, lazy
//! field materialization, the schedule executor, and the player transport
//! (§3 `RuntimeState`, §4.1, §4.8, §4.9).
pub mod executor;
pub mod field_materializer;
pub mod player;
pub mod state_buffer;
pub mod value_store;

pub use executor::Executor;
pub use player::Player;
pub use state_buffer::StateBuffer;
pub use value_store::ValueStore;
