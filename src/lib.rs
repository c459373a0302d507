//! Purpose: Library crate backing the `misphere-stitch` CLI and its tests.
//! Exports: `api` (stable facade), `config`, `core` (bridge, app control, pose, errors), `paths`.
//! Role: Drives a stitching app on an attached Android device over adb.
//! Invariants: Core modules take device paths and timing as explicit inputs, never globals.
pub mod api;
pub mod config;
pub mod core;
pub mod paths;
