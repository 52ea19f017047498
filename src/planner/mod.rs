//! Adaptive investigation planning.
//!
//! An investigation moves through
//! `Initializing → Planning → Executing ⇄ Adapting → {Paused | Completed | Aborted}`.
//! [`InvestigationPlanner::start`] seeds the evidence graph and asks the
//! oracle panel for a strategy; [`InvestigationPlanner::run`] drains the
//! action queue one action at a time, re-planning when a result is weak or
//! alarming and asking the decision recorder whether to go on.

mod engine;
mod recovery;
mod strategy;
mod types;


pub use engine::{Continuation, InvestigationPlanner};
pub use recovery::{recovery_strategy, RecoveryStrategy};
pub use strategy::{default_actions, parse_strategy, url_host, ParsedStrategy, SeededItem};
pub use types::*;
