pub mod auth_service;
pub mod exec_service;
pub mod paste_service;
pub mod profile_service;
