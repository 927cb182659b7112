//! Apps Script execution facade.
//!
//! Runs functions of an Apps Script project through the execution API, over a
//! shared [`gworks_auth::Connection`].

pub mod execution;

pub use execution::{ScriptRunner, StackFrame};
