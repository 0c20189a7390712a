//! relimg CLI - pin Operator bundle manifest images by digest.

pub mod commands;
pub mod output;
