//! Subscription Service - Paid subscription lifecycle management
//!
//! This crate manages plan subscriptions through payment, cancellation and
//! refund, driven by user requests over HTTP and by billing provider
//! outcomes consumed from an event stream with exactly-once effects.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
