//! `digest` command-line front-end over the `digest-sheets` data layer.

pub mod cli;
