//! # spcam-ctl: serial camera console
//!
//! Connects to the camera over its serial device node and drives it
//! from a numbered text menu: record at QVGA/VGA/HD, stop, snapshot,
//! white balance, shutdown. Recordings and snapshots land in the
//! configured directories.
//!
//! Optionally keeps a file updated with the newest live frame so an
//! image viewer can act as a preview window.

pub mod config;
pub mod console;
pub mod preview;
