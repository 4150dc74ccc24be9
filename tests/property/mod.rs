pub mod merkle_properties;
pub mod ledger_properties;
