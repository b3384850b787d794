#![cfg_attr(not(test), forbid(unsafe_code))]

//! Wire models and configuration shared by the FleetDesk messaging client and CLI.

pub mod config;
pub mod models;
