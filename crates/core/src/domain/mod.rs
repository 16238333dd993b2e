pub mod estimate;
pub mod project;
pub mod question;
pub mod takeoff;
