pub mod background_jobs;
pub mod completion_service;
pub mod earnings;
pub mod error;
pub mod notification_service;
pub mod payment_provider;
pub mod payout_service;
pub mod reassignment_service;
