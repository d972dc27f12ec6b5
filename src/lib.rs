//! Workspace root crate; exists only to host repository-wide dev tooling (cargo-husky hooks).
