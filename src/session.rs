/// Session key holding the logged-in contact email.
pub const EMAIL: &str = "email";
