/*
 * This module provides the application logic layer, centered around
 * `SolutionSession`, which owns the loaded solution and is what a presentation
 * layer binds to. Unit tests for `SolutionSession` are in `session_tests.rs`.
 */
pub mod session;

#[cfg(test)]
mod session_tests;

pub use session::{
    MessageSeverity, SessionError, SessionEvent, SolutionSession, StatusMessage,
};
