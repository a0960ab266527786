//! Integration tests for dialogue line generation

mod config_integration;
mod generation_lifecycle;
mod linearization;
mod test_utils;
