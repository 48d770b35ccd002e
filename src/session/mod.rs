pub mod interface;
pub mod session;
pub mod session_controller;
pub mod socket;
