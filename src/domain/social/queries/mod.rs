pub mod accounts;
pub mod leases;
pub mod posts;
pub mod settings;
