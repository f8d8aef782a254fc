//! Common test utilities

pub mod domoticz_mock;
pub mod test_fixtures;
