pub mod completionmodel;
pub mod payoutmodel;
pub mod usermodel;
