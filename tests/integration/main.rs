//! Integration tests for the circulation server

mod api_tests;
mod postgres_tests;
