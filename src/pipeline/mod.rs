pub mod annotate;
pub mod extraction;
pub mod judgment;
pub mod matcher;
pub mod playbook;
pub mod processor;
pub mod retry;
