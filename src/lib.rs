//! strand - graph-based workflow execution engine
//!
//! strand interprets workflows: directed graphs of typed processing nodes
//! joined by static or conditional edges. One execution walks the graph
//! from the start node to the end node, threading parameters, config
//! variables, mutable state, and prior node outputs through each node's
//! template-expanded config, while journaling every lifecycle transition
//! and optionally emitting a live event stream.
//!
//! ## Example
//!
//! ```json
//! {
//!   "id": "counter",
//!   "name": "Counter loop",
//!   "state": {"count": 0},
//!   "nodes": [
//!     {
//!       "id": "bump",
//!       "type": "transform",
//!       "config": {"value": {"count": "{{state.count}}"}},
//!       "setState": [{"key": "count", "rule": "count = state.count + 1"}]
//!     },
//!     {"id": "done", "type": "transform", "config": {"value": {"done": true}}}
//!   ],
//!   "edges": [
//!     {"id": "loop", "from": "bump", "rule": [
//!       {"if": "state.count < 3", "return": "'bump'"},
//!       {"return": "'done'"}
//!     ]}
//!   ],
//!   "startNode": "bump",
//!   "endNode": "done"
//! }
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod executors;
pub mod storage;
pub mod template;
pub mod validation;
pub mod workflow;

pub use error::{Error, Result};
