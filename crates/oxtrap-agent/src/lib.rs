//! Shell-check to SNMP trap agent.
//!
//! [`config::TrapConfig`] describes the OID root, the trap receivers and the
//! rules; [`scheduler::RuleScheduler`] runs every rule on its own interval
//! and sends the resulting traps.

pub mod cli;
pub mod config;
pub mod scheduler;
