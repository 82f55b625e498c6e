//! Kubernetes client for kubeai
//!
//! This crate provides Kubernetes API integration for resolving workloads to
//! their pods and opening pod log streams.

mod client;
mod selector;

pub use client::{KubeClient, LogBytes};
pub use selector::format_label_selector;

// Re-export types that are used in our public API
pub use kubeai_types::{PodInfo, ResourceKind};
