//! Turnstile - Request Admission Control Service
//!
//! This crate implements a request admission control service: every incoming
//! request is admitted or rejected based on a sliding one-second window of
//! recent admissions per identity (client IP or issued API key), with a
//! temporary block on quota breach. Counters live behind a pluggable store
//! so a single instance can run entirely in-process while a fleet shares
//! state through Redis.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
