//! Security gate evaluated before every externally visible effect.
//!
//! ```text
//!   engine ── Action ──▶ SecurityChecker::check ──▶ SecurityDecision
//!                              │                        ├── allowed → proceed
//!                              └── SecurityPolicy       └── denied  → exit 126, no side effect
//! ```

mod checker;
mod policy;

pub use checker::{Action, Rule, SecurityChecker, SecurityDecision, SecurityReport};
pub use policy::SecurityPolicy;
