pub mod fairness_tests;
pub mod merkle_tests;
