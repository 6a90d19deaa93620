pub mod commands;
pub mod config;
pub mod diag;
pub mod kube;
pub mod label;
pub mod status;
