//! Constraint naming convention shared by the DDL script and the metadata.
//!
//! Names are stable across database engines so that schema tooling never has
//! to guess what the engine generated.

pub fn primary_key(table: &str) -> String {
    format!("pk_{table}")
}

pub fn foreign_key(table: &str, column: &str, referred_table: &str) -> String {
    format!("fk_{table}_{column}_{referred_table}")
}

pub fn index(table: &str, column: &str) -> String {
    format!("ix_{table}_{column}")
}

pub fn check(table: &str, constraint: &str) -> String {
    format!("ck_{table}_{constraint}")
}
