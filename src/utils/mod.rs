// Utilities module
//
// This module contains common utility functions:
// - path: Path joining and encoding for upstream URIs
// - validation: Common validation helpers

pub mod path;
pub mod validation;
