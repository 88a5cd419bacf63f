//! Helpers for preparing throwaway databases in tests and examples.

pub mod prepare_env;
