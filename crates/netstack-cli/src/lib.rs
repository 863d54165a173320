//! Netstack CLI
//!
//! Command-line front end for carving tenant networks out of address
//! ranges and attaching instances to them.

pub mod commands;
pub mod output;

#[cfg(test)]
mod tests;
