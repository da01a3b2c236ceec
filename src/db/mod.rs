pub mod completiondb;
pub mod db;
pub mod payoutdb;
pub mod userdb;
