/// Session key under which the auth layer stores the logged-in user's id.
pub const USER_ID: &str = "user_id";
