//! Foundation utilities shared by every engine subsystem

pub mod logging;
